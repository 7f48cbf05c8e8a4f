use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::warn;

use super::config::OrderedBuildGroup;
use crate::error::{Result, SkwError};
use crate::plan::BuildEntry;

/// Reorder entries so every dependency precedes its dependents.
///
/// Strongly connected components larger than one node (or with a self-loop)
/// must be covered by an `[[ordered_build_groups]]` table; the group's
/// members collapse into one super-node emitted in the configured order.
/// Ties in the topological sort break by XML discovery index, so the result
/// is stable across runs.
pub fn order_entries(
    entries: Vec<BuildEntry>,
    groups: &[OrderedBuildGroup],
) -> Result<Vec<BuildEntry>> {
    let n = entries.len();
    if n == 0 {
        return Ok(entries);
    }

    let keys: Vec<String> = entries.iter().map(node_key).collect();
    let mut index_of: HashMap<&str, usize> = HashMap::new();
    for (i, key) in keys.iter().enumerate() {
        if index_of.insert(key.as_str(), i).is_some() {
            warn!("duplicate package name '{}' in plan; edges bind to the first", key);
        }
    }

    // Dependency edges: entry -> dependency.
    let mut deps_adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut self_loop = vec![false; n];
    for (i, entry) in entries.iter().enumerate() {
        for dep in &entry.dependencies {
            match index_of.get(dep.as_str()) {
                Some(&j) if j == i => self_loop[i] = true,
                Some(&j) => deps_adj[i].push(j),
                None => warn!(
                    "entry '{}' depends on unknown package '{}'",
                    keys[i], dep
                ),
            }
        }
    }

    let sccs = tarjan_sccs(&deps_adj);

    // Assign every node to a super-node; cyclic SCCs must map onto a group.
    let mut super_of: Vec<usize> = (0..n).collect();
    let mut super_members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let mut grouped: HashMap<usize, usize> = HashMap::new(); // group idx -> super idx

    for scc in &sccs {
        let cyclic = scc.len() > 1 || self_loop[scc[0]];
        if !cyclic {
            continue;
        }

        let member_names: Vec<String> = scc.iter().map(|&i| keys[i].clone()).collect();
        let covering: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, g)| member_names.iter().all(|m| g.packages.contains(m)))
            .map(|(gi, _)| gi)
            .collect();

        match covering.as_slice() {
            [] => {
                let mut names = member_names;
                names.sort();
                return Err(SkwError::UnhandledCycle(names));
            }
            [gi] => {
                // The super-node holds every group member present in the
                // plan, in the configured order.
                let group = &groups[*gi];
                let members: Vec<usize> = group
                    .packages
                    .iter()
                    .filter_map(|p| index_of.get(p.as_str()).copied())
                    .collect();
                let root = members[0];
                grouped.insert(*gi, root);
                for &m in &members {
                    super_of[m] = root;
                }
                super_members[root] = members.clone();
            }
            _ => {
                return Err(SkwError::ConfigInvalid(format!(
                    "cycle [{}] is covered by more than one ordered build group",
                    member_names.join(", ")
                )));
            }
        }
    }

    // Tie-break key per super-node: minimum discovery index, shifted by the
    // group anchor when one is configured.
    let mut priority: HashMap<usize, i64> = HashMap::new();
    for s in super_of.iter().copied().collect::<HashSet<_>>() {
        let min_discovery = super_members[s].iter().copied().min().unwrap_or(s) as i64;
        priority.insert(s, min_discovery);
    }
    for (gi, &root) in &grouped {
        if let Some(anchor) = &groups[*gi].anchor {
            let key = match anchor.as_str() {
                "first" => -1,
                "last" => i64::MAX,
                name => match index_of.get(name) {
                    Some(&i) => i as i64,
                    None => {
                        warn!("ordered build group anchor '{}' not found in plan", name);
                        continue;
                    }
                },
            };
            priority.insert(root, key);
        }
    }

    // Kahn over the contracted DAG: edge dependency -> dependent, so a
    // node becomes ready once everything it depends on has been emitted.
    let mut succ: HashMap<usize, HashSet<usize>> = HashMap::new();
    let mut indegree: HashMap<usize, usize> = HashMap::new();
    for s in priority.keys() {
        indegree.insert(*s, 0);
    }
    for (i, deps) in deps_adj.iter().enumerate() {
        for &j in deps {
            let (from, to) = (super_of[j], super_of[i]);
            if from == to {
                continue;
            }
            if succ.entry(from).or_default().insert(to) {
                *indegree.entry(to).or_default() += 1;
            }
        }
    }

    let mut heap: BinaryHeap<Reverse<(i64, usize)>> = indegree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&s, _)| Reverse((priority[&s], s)))
        .collect();

    let mut ordered_nodes = Vec::with_capacity(n);
    while let Some(Reverse((_, s))) = heap.pop() {
        ordered_nodes.extend(super_members[s].iter().copied());
        if let Some(nexts) = succ.get(&s) {
            for &t in nexts {
                let d = indegree.get_mut(&t).unwrap();
                *d -= 1;
                if *d == 0 {
                    heap.push(Reverse((priority[&t], t)));
                }
            }
        }
    }

    if ordered_nodes.len() != n {
        // A residual cycle across super-nodes; groups did not break it.
        let emitted: HashSet<usize> = ordered_nodes.iter().copied().collect();
        let mut names: Vec<String> = (0..n)
            .filter(|i| !emitted.contains(i))
            .map(|i| keys[i].clone())
            .collect();
        names.sort();
        return Err(SkwError::UnhandledCycle(names));
    }

    let mut slots: Vec<Option<BuildEntry>> = entries.into_iter().map(Some).collect();
    Ok(ordered_nodes
        .into_iter()
        .map(|i| slots[i].take().expect("node emitted twice"))
        .collect())
}

fn node_key(entry: &BuildEntry) -> String {
    if entry.package_name.is_empty() {
        entry.slug()
    } else {
        entry.package_name.clone()
    }
}

/// Tarjan's algorithm; SCCs are returned in an order compatible with the
/// dependency edges (callees before callers), though only membership is
/// used here.
fn tarjan_sccs(adj: &[Vec<usize>]) -> Vec<Vec<usize>> {
    struct State<'a> {
        adj: &'a [Vec<usize>],
        counter: usize,
        index: Vec<Option<usize>>,
        low: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        sccs: Vec<Vec<usize>>,
    }

    fn strongconnect(state: &mut State, v: usize) {
        state.index[v] = Some(state.counter);
        state.low[v] = state.counter;
        state.counter += 1;
        state.stack.push(v);
        state.on_stack[v] = true;

        for i in 0..state.adj[v].len() {
            let w = state.adj[v][i];
            if state.index[w].is_none() {
                strongconnect(state, w);
                state.low[v] = state.low[v].min(state.low[w]);
            } else if state.on_stack[w] {
                state.low[v] = state.low[v].min(state.index[w].unwrap());
            }
        }

        if state.low[v] == state.index[v].unwrap() {
            let mut scc = Vec::new();
            loop {
                let w = state.stack.pop().unwrap();
                state.on_stack[w] = false;
                scc.push(w);
                if w == v {
                    break;
                }
            }
            scc.sort_unstable();
            state.sccs.push(scc);
        }
    }

    let n = adj.len();
    let mut state = State {
        adj,
        counter: 0,
        index: vec![None; n],
        low: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        sccs: Vec::new(),
    };
    for v in 0..n {
        if state.index[v].is_none() {
            strongconnect(&mut state, v);
        }
    }
    state.sccs
}
