use std::collections::{HashMap, HashSet, VecDeque};

use regex::Regex;

use super::file::Task;

/// Parse dependency task ids out of free text. Recognized conventions
/// (case-insensitive): `blocked by #ID` / `depends on #ID`, and
/// `blockedBy: [ID, ID, ...]`. This is a convenience layered on top of the
/// registry's explicit `blockedBy` field — it never replaces an explicit
/// `add_blocker` call, and text it cannot parse is left untouched rather
/// than erroring.
pub fn parse_inline_dependencies(text: &str) -> Vec<String> {
    let mut deps = Vec::new();

    let inline_re = Regex::new(r"(?i)(?:blocked\s+by|depends\s+on)\s+#(\S+)").unwrap();
    for cap in inline_re.captures_iter(text) {
        deps.push(cap[1].trim_end_matches(['.', ',']).to_string());
    }

    let list_re = Regex::new(r"(?i)blockedBy:\s*\[([^\]]+)\]").unwrap();
    for cap in list_re.captures_iter(text) {
        for id in cap[1].split(',') {
            let id = id.trim().trim_matches('"');
            if !id.is_empty() {
                deps.push(id.to_string());
            }
        }
    }

    deps.sort();
    deps.dedup();
    deps
}

/// Topologically sort `tasks` by their `blockedBy` edges (Kahn's algorithm).
/// Dependencies on ids outside the given set are ignored. Cycles are broken
/// by appending cycle members in id order, same as how the algorithm this
/// is adapted from handles unresolved cycles.
pub fn topological_sort(tasks: Vec<Task>) -> Vec<Task> {
    if tasks.len() <= 1 {
        return tasks;
    }

    let group_ids: HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();

    let mut successors: HashMap<String, Vec<String>> = HashMap::new();
    let mut in_degree: HashMap<String, usize> = HashMap::new();
    for id in &group_ids {
        in_degree.insert(id.clone(), 0);
    }

    for task in &tasks {
        for dep in &task.blocked_by {
            if group_ids.contains(dep) && dep != &task.id {
                successors.entry(dep.clone()).or_default().push(task.id.clone());
                *in_degree.entry(task.id.clone()).or_default() += 1;
            }
        }
    }

    let mut roots: Vec<String> = in_degree
        .iter()
        .filter(|&(_, deg)| *deg == 0)
        .map(|(id, _)| id.clone())
        .collect();
    roots.sort();
    let mut queue: VecDeque<String> = roots.into_iter().collect();

    let mut sorted_ids: Vec<String> = Vec::with_capacity(group_ids.len());
    while let Some(id) = queue.pop_front() {
        sorted_ids.push(id.clone());
        if let Some(succs) = successors.get(&id) {
            let mut newly_ready = Vec::new();
            for succ in succs {
                let deg = in_degree.get_mut(succ).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    newly_ready.push(succ.clone());
                }
            }
            newly_ready.sort();
            queue.extend(newly_ready);
        }
    }

    if sorted_ids.len() < group_ids.len() {
        let sorted_set: HashSet<String> = sorted_ids.iter().cloned().collect();
        let mut remaining: Vec<String> = group_ids.difference(&sorted_set).cloned().collect();
        remaining.sort();
        sorted_ids.extend(remaining);
    }

    let mut task_map: HashMap<String, Task> =
        tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
    sorted_ids
        .into_iter()
        .filter_map(|id| task_map.remove(&id))
        .collect()
}

#[derive(Default)]
struct TarjanState {
    index: usize,
    indices: HashMap<String, usize>,
    lowlink: HashMap<String, usize>,
    stack: Vec<String>,
    on_stack: HashSet<String>,
    components: Vec<Vec<String>>,
}

/// Detects strongly-connected components among `blockedBy` edges, used to
/// flag cyclic task dependencies the registry should refuse to deepen.
pub struct DependencyGraph {
    edges: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    pub fn build(tasks: &[Task]) -> Self {
        let mut edges = HashMap::new();
        for task in tasks {
            if !task.blocked_by.is_empty() {
                edges.insert(task.id.clone(), task.blocked_by.iter().cloned().collect());
            }
        }
        Self { edges }
    }

    /// Returns the set of task ids that participate in a dependency cycle.
    pub fn cyclic_ids(&self) -> HashSet<String> {
        let all_nodes: HashSet<String> = self
            .edges
            .keys()
            .cloned()
            .chain(self.edges.values().flat_map(|deps| deps.iter().cloned()))
            .collect();
        let mut nodes: Vec<String> = all_nodes.into_iter().collect();
        nodes.sort();

        let mut state = TarjanState::default();
        for node in nodes {
            if !state.indices.contains_key(&node) {
                self.strong_connect(&node, &mut state);
            }
        }

        let mut cyclic = HashSet::new();
        for component in state.components {
            let has_self_loop = component
                .iter()
                .any(|n| self.edges.get(n).is_some_and(|deps| deps.contains(n)));
            if component.len() > 1 || has_self_loop {
                cyclic.extend(component);
            }
        }
        cyclic
    }

    fn strong_connect(&self, node: &str, state: &mut TarjanState) {
        state.indices.insert(node.to_string(), state.index);
        state.lowlink.insert(node.to_string(), state.index);
        state.index += 1;
        state.stack.push(node.to_string());
        state.on_stack.insert(node.to_string());

        if let Some(deps) = self.edges.get(node) {
            let mut sorted_deps: Vec<String> = deps.iter().cloned().collect();
            sorted_deps.sort();
            for dep in sorted_deps {
                if !state.indices.contains_key(&dep) {
                    self.strong_connect(&dep, state);
                    let dep_low = state.lowlink[&dep];
                    let node_low = state.lowlink.get_mut(node).unwrap();
                    *node_low = (*node_low).min(dep_low);
                } else if state.on_stack.contains(&dep) {
                    let dep_index = state.indices[&dep];
                    let node_low = state.lowlink.get_mut(node).unwrap();
                    *node_low = (*node_low).min(dep_index);
                }
            }
        }

        if state.lowlink[node] == state.indices[node] {
            let mut component = Vec::new();
            while let Some(stack_node) = state.stack.pop() {
                state.on_stack.remove(&stack_node);
                let is_target = stack_node == node;
                component.push(stack_node);
                if is_target {
                    break;
                }
            }
            state.components.push(component);
        }
    }
}
