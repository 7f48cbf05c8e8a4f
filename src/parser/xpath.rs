use roxmltree::Node;

use crate::error::{Result, SkwError};

/// The XPath subset the parser configs use: absolute (`/book/chapter`),
/// descendant (`//chapter`, also between steps), relative (`./version`),
/// wildcard (`*`), attribute steps (`./@id`), `text()`, and the predicates
/// `[@attr='value']` and 1-based `[n]`.
///
/// Expressions are parsed once and evaluated against any context node.
#[derive(Debug, Clone)]
pub struct XPath {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone)]
enum Step {
    Element {
        descendant: bool,
        /// None matches any element (`*`).
        name: Option<String>,
        predicate: Option<Predicate>,
    },
    Attribute(String),
    Text,
    SelfNode,
}

#[derive(Debug, Clone)]
enum Predicate {
    AttrEquals(String, String),
    Position(usize),
}

impl XPath {
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(SkwError::XpathInvalid("empty expression".to_string()));
        }

        let (absolute, mut rest, mut first_descendant) = if let Some(r) = expr.strip_prefix("//") {
            (true, r, true)
        } else if let Some(r) = expr.strip_prefix('/') {
            (true, r, false)
        } else if let Some(r) = expr.strip_prefix(".//") {
            (false, r, true)
        } else if let Some(r) = expr.strip_prefix("./") {
            (false, r, false)
        } else if expr == "." {
            (false, "", false)
        } else {
            (false, expr, false)
        };

        let mut steps = Vec::new();
        if expr == "." {
            steps.push(Step::SelfNode);
            return Ok(Self { absolute, steps });
        }

        while !rest.is_empty() {
            let (segment, remainder, next_descendant) = split_step(rest)?;
            let step = parse_step(segment, first_descendant)?;

            let terminal = matches!(step, Step::Attribute(_) | Step::Text);
            if terminal && !remainder.is_empty() {
                return Err(SkwError::XpathInvalid(format!(
                    "'{}' continues past a terminal step",
                    expr
                )));
            }

            steps.push(step);
            rest = remainder;
            first_descendant = next_descendant;
        }

        if steps.is_empty() {
            return Err(SkwError::XpathInvalid(format!("'{}' has no steps", expr)));
        }

        Ok(Self { absolute, steps })
    }

    /// Select element nodes. Expressions ending in `@attr` or `text()`
    /// select nothing; use [`XPath::strings`] for those.
    pub fn select<'a, 'input>(&self, ctx: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
        let mut current = vec![self.start(ctx)];
        for step in &self.steps {
            match step {
                Step::SelfNode => {}
                Step::Element {
                    descendant,
                    name,
                    predicate,
                } => {
                    current = apply_element_step(&current, *descendant, name.as_deref(), predicate);
                }
                Step::Attribute(_) | Step::Text => return Vec::new(),
            }
        }
        current
    }

    /// Evaluate to strings: the attribute value or text node content for
    /// terminal `@attr`/`text()` steps, otherwise the full concatenated
    /// descendant text of every matched element.
    pub fn strings(&self, ctx: Node<'_, '_>) -> Vec<String> {
        let mut current = vec![self.start(ctx)];
        for step in &self.steps {
            match step {
                Step::SelfNode => {}
                Step::Element {
                    descendant,
                    name,
                    predicate,
                } => {
                    current = apply_element_step(&current, *descendant, name.as_deref(), predicate);
                }
                Step::Attribute(attr) => {
                    return current
                        .iter()
                        .filter_map(|n| n.attribute(attr.as_str()))
                        .map(|v| v.to_string())
                        .collect();
                }
                Step::Text => {
                    return current.iter().map(|n| node_text(*n)).collect();
                }
            }
        }
        current.iter().map(|n| node_text(*n)).collect()
    }

    fn start<'a, 'input>(&self, ctx: Node<'a, 'input>) -> Node<'a, 'input> {
        if self.absolute {
            ctx.document().root()
        } else {
            ctx
        }
    }
}

/// Full text content of a node: every descendant text node, concatenated,
/// outer whitespace trimmed.
pub fn node_text(node: Node<'_, '_>) -> String {
    let mut out = String::new();
    for descendant in node.descendants() {
        if descendant.is_text() {
            if let Some(text) = descendant.text() {
                out.push_str(text);
            }
        }
    }
    out.trim().to_string()
}

fn apply_element_step<'a, 'input>(
    current: &[Node<'a, 'input>],
    descendant: bool,
    name: Option<&str>,
    predicate: &Option<Predicate>,
) -> Vec<Node<'a, 'input>> {
    let mut next = Vec::new();
    for node in current {
        let matched: Vec<Node> = if descendant {
            node.descendants()
                .skip(1)
                .filter(|n| element_matches(*n, name))
                .collect()
        } else {
            node.children().filter(|n| element_matches(*n, name)).collect()
        };

        match predicate {
            None => next.extend(matched),
            Some(Predicate::Position(pos)) => {
                if let Some(n) = matched.get(pos.saturating_sub(1)) {
                    next.push(*n);
                }
            }
            Some(Predicate::AttrEquals(attr, value)) => {
                next.extend(
                    matched
                        .into_iter()
                        .filter(|n| n.attribute(attr.as_str()) == Some(value.as_str())),
                );
            }
        }
    }
    next
}

fn element_matches(node: Node<'_, '_>, name: Option<&str>) -> bool {
    node.is_element() && name.is_none_or(|n| node.tag_name().name() == n)
}

/// Split off the leading step of `rest` at a `/` that is outside brackets
/// and quotes. Returns (segment, remainder, remainder_starts_descendant).
fn split_step(rest: &str) -> Result<(&str, &str, bool)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in rest.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'') | (None, '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    SkwError::XpathInvalid(format!("unbalanced ']' in '{}'", rest))
                })?;
            }
            (None, '/') if depth == 0 => {
                let segment = &rest[..i];
                let remainder = &rest[i + 1..];
                if let Some(r) = remainder.strip_prefix('/') {
                    return Ok((segment, r, true));
                }
                if remainder.is_empty() {
                    return Err(SkwError::XpathInvalid(format!("trailing '/' in '{}'", rest)));
                }
                return Ok((segment, remainder, false));
            }
            _ => {}
        }
    }
    if depth != 0 || quote.is_some() {
        return Err(SkwError::XpathInvalid(format!(
            "unbalanced predicate in '{}'",
            rest
        )));
    }
    Ok((rest, "", false))
}

fn parse_step(segment: &str, descendant: bool) -> Result<Step> {
    if segment.is_empty() {
        return Err(SkwError::XpathInvalid("empty step".to_string()));
    }
    if segment == "." {
        return Ok(Step::SelfNode);
    }
    if let Some(attr) = segment.strip_prefix('@') {
        if attr.is_empty() || attr.contains(['[', ']']) {
            return Err(SkwError::XpathInvalid(format!("bad attribute step '{}'", segment)));
        }
        return Ok(Step::Attribute(attr.to_string()));
    }
    if segment == "text()" {
        return Ok(Step::Text);
    }

    let (name_part, predicate) = match segment.find('[') {
        None => (segment, None),
        Some(open) => {
            let close = segment
                .rfind(']')
                .filter(|&c| c == segment.len() - 1 && c > open)
                .ok_or_else(|| {
                    SkwError::XpathInvalid(format!("bad predicate in step '{}'", segment))
                })?;
            (&segment[..open], Some(parse_predicate(&segment[open + 1..close])?))
        }
    };

    let name = match name_part {
        "*" => None,
        "" => return Err(SkwError::XpathInvalid(format!("bad step '{}'", segment))),
        n => Some(n.to_string()),
    };

    Ok(Step::Element {
        descendant,
        name,
        predicate,
    })
}

fn parse_predicate(body: &str) -> Result<Predicate> {
    let body = body.trim();
    if let Ok(pos) = body.parse::<usize>() {
        if pos == 0 {
            return Err(SkwError::XpathInvalid("positions are 1-based".to_string()));
        }
        return Ok(Predicate::Position(pos));
    }
    if let Some(rest) = body.strip_prefix('@') {
        if let Some(eq) = rest.find('=') {
            let attr = rest[..eq].trim();
            let value = rest[eq + 1..].trim();
            let unquoted = value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')));
            if let (false, Some(v)) = (attr.is_empty(), unquoted) {
                return Ok(Predicate::AttrEquals(attr.to_string(), v.to_string()));
            }
        }
    }
    Err(SkwError::XpathInvalid(format!("unsupported predicate '[{}]'", body)))
}
