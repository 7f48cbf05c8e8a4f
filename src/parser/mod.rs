pub mod config;
pub mod custom;
pub mod order;
pub mod xpath;

use std::collections::HashMap;
use std::path::PathBuf;

use roxmltree::Node;
use tracing::{debug, info, warn};

use crate::config::BuilderConfig;
use crate::error::{Result, SkwError};
use crate::plan::{BuildEntry, BuildPlan, Sources};
use crate::util::substitute::{context_variables, substitute};
use self::config::ParserConfig;
use self::xpath::XPath;

/// Run the parser stage: XML book in, ordered JSON build plan out.
/// Returns the path of the written plan.
pub fn run(builder: &BuilderConfig, book: &str, profile: &str) -> Result<PathBuf> {
    let profile_dir = builder.profile_dir(book, profile);
    let cfg = ParserConfig::load(&profile_dir.join("parser.toml"))?;

    let base_vars = context_variables(book, profile, &builder.build_dir.to_string_lossy());

    let xml_path = PathBuf::from(substitute(&cfg.main.xml_path, &base_vars));
    if !xml_path.exists() {
        return Err(SkwError::XmlMissing(xml_path));
    }
    let xml_content = std::fs::read_to_string(&xml_path)?;
    let doc = roxmltree::Document::parse(&xml_content)
        .map_err(|e| SkwError::XmlMalformed(format!("{}: {}", xml_path.display(), e)))?;

    info!("parsing {} for {}/{}", xml_path.display(), book, profile);

    let mut entries = collect_entries(&cfg, doc.root(), book, &base_vars)?;

    if !cfg.custom_code.configs.is_empty() {
        let custom_entries = custom::inject(
            &cfg.custom_code.configs,
            &profile_dir,
            doc.root(),
            book,
            &base_vars,
        )?;
        info!("injected {} custom package entries", custom_entries.len());
        entries.extend(custom_entries);
    }

    BuildPlan::new(entries.clone()).validate()?;
    let ordered = order::order_entries(entries, &cfg.ordered_build_groups)?;
    let plan = BuildPlan::new(ordered);

    let out_path = builder
        .parser_out_dir(book, profile)
        .join(substitute(&cfg.main.output_file, &base_vars));
    plan.save(&out_path)?;
    info!("wrote {} entries to {}", plan.entries.len(), out_path.display());

    Ok(out_path)
}

fn collect_entries(
    cfg: &ParserConfig,
    root: Node<'_, '_>,
    book: &str,
    base_vars: &HashMap<String, String>,
) -> Result<Vec<BuildEntry>> {
    let chapters_expr = cfg.xpaths.get("chapters").ok_or_else(|| {
        SkwError::ConfigInvalid("parser.toml: [xpaths] is missing the 'chapters' key".to_string())
    })?;
    let chapters = XPath::parse(&substitute(chapters_expr, base_vars))?.select(root);

    let mut entries = Vec::new();
    for chapter in chapters {
        let chapter_id = first_string(cfg, "chapter_id", "", "", chapter, base_vars)?;
        if chapter_id.is_empty() {
            warn!("skipping chapter without an id");
            continue;
        }
        if !cfg.chapter_filters.keeps(&chapter_id) {
            debug!("chapter {} filtered out", chapter_id);
            continue;
        }

        let sections_expr = cfg.xpath_for("sections", &chapter_id, "").ok_or_else(|| {
            SkwError::ConfigInvalid("parser.toml: [xpaths] is missing the 'sections' key".to_string())
        })?;
        let sections = XPath::parse(&substitute(sections_expr, base_vars))?.select(chapter);

        for section in sections {
            let section_id = first_string(cfg, "section_id", &chapter_id, "", section, base_vars)?;
            if section_id.is_empty() {
                warn!("skipping section without an id in chapter {}", chapter_id);
                continue;
            }
            if !cfg.section_filters.keeps(&section_id) {
                debug!("section {} filtered out", section_id);
                continue;
            }

            entries.push(extract_entry(
                cfg, section, book, &chapter_id, &section_id, base_vars,
            )?);
        }
    }

    Ok(entries)
}

/// Build one entry from its section node. Keys extracted earlier
/// (`package_name`, then `package_version`) become available as `${...}`
/// substitutions in the later expressions.
fn extract_entry(
    cfg: &ParserConfig,
    section: Node<'_, '_>,
    book: &str,
    chapter_id: &str,
    section_id: &str,
    base_vars: &HashMap<String, String>,
) -> Result<BuildEntry> {
    let mut vars = base_vars.clone();
    vars.insert("chapter_id".to_string(), chapter_id.to_string());
    vars.insert("section_id".to_string(), section_id.to_string());

    let package_name = first_string(cfg, "package_name", chapter_id, section_id, section, &vars)?;
    vars.insert("package_name".to_string(), package_name.clone());

    let package_version =
        first_string(cfg, "package_version", chapter_id, section_id, section, &vars)?;
    vars.insert("package_version".to_string(), package_version.clone());

    let sources = Sources {
        titles: all_strings(cfg, "source_titles", chapter_id, section_id, section, &vars)?,
        urls: all_strings(cfg, "source_urls", chapter_id, section_id, section, &vars)?,
        checksums: all_strings(cfg, "source_checksums", chapter_id, section_id, section, &vars)?,
    };

    let dependencies = all_strings(cfg, "dependencies", chapter_id, section_id, section, &vars)?
        .iter()
        .flat_map(|s| s.split([',', ' ', '\n', '\t']))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let build_instructions =
        all_strings(cfg, "build_instructions", chapter_id, section_id, section, &vars)?;

    Ok(BuildEntry {
        source_book: book.to_string(),
        chapter_id: chapter_id.to_string(),
        section_id: section_id.to_string(),
        package_name,
        package_version,
        sources,
        dependencies,
        build_instructions,
    })
}

fn all_strings(
    cfg: &ParserConfig,
    key: &str,
    chapter_id: &str,
    section_id: &str,
    context: Node<'_, '_>,
    vars: &HashMap<String, String>,
) -> Result<Vec<String>> {
    match cfg.xpath_for(key, chapter_id, section_id) {
        None => Ok(Vec::new()),
        Some(expr) => Ok(XPath::parse(&substitute(expr, vars))?.strings(context)),
    }
}

fn first_string(
    cfg: &ParserConfig,
    key: &str,
    chapter_id: &str,
    section_id: &str,
    context: Node<'_, '_>,
    vars: &HashMap<String, String>,
) -> Result<String> {
    Ok(all_strings(cfg, key, chapter_id, section_id, context, vars)?
        .into_iter()
        .next()
        .unwrap_or_default())
}
