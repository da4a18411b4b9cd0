use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::errors::GraphError;
use crate::model::Stage;

/// A sequence as declared in configuration: a name and its tokens, each
/// naming either a task or a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceDecl {
    pub name: String,
    pub tokens: Vec<String>,
}

/// An expanded sequence. Every group is a chain of tasks sharing one
/// dependency slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub name: String,
    pub groups: Vec<Vec<String>>,
}

impl Sequence {
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().flatten().map(String::as_str)
    }
}

pub type Plan = BTreeMap<Stage, Vec<Sequence>>;

#[derive(Debug, Default)]
pub struct TaskGraph {
    stages: BTreeMap<Stage, Vec<SequenceDecl>>,
    groups: HashMap<String, Vec<String>>,
    plan: OnceCell<Result<Plan, GraphError>>,
}

impl TaskGraph {
    pub fn new(
        stages: BTreeMap<Stage, Vec<SequenceDecl>>,
        groups: HashMap<String, Vec<String>>,
    ) -> Self {
        Self {
            stages,
            groups,
            plan: OnceCell::new(),
        }
    }

    fn expand(&self) -> Result<Plan, GraphError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut plan = Plan::new();

        for (stage, decls) in &self.stages {
            let mut sequences = Vec::with_capacity(decls.len());
            for decl in decls {
                let mut groups = Vec::with_capacity(decl.tokens.len());
                for token in &decl.tokens {
                    let tasks = match self.groups.get(token) {
                        Some(members) => members.clone(),
                        None => vec![token.clone()],
                    };
                    for task in &tasks {
                        if !seen.insert(task.clone()) {
                            return Err(GraphError::DuplicateTask(task.clone()));
                        }
                    }
                    if !tasks.is_empty() {
                        groups.push(tasks);
                    }
                }
                sequences.push(Sequence {
                    name: decl.name.clone(),
                    groups,
                });
            }
            plan.insert(*stage, sequences);
        }

        Ok(plan)
    }

    /// The expanded plan. Duplicate task names are reported here, once.
    pub fn plan(&self) -> Result<&Plan, GraphError> {
        self.plan
            .get_or_init(|| self.expand())
            .as_ref()
            .map_err(Clone::clone)
    }

    pub fn sequences(&self, stage: Stage) -> Result<&[Sequence], GraphError> {
        Ok(self
            .plan()?
            .get(&stage)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// Every task name, in execution order.
    pub fn tasks(&self) -> Result<Vec<&str>, GraphError> {
        Ok(self
            .plan()?
            .values()
            .flatten()
            .flat_map(Sequence::tasks)
            .collect())
    }

    pub fn stage_of(&self, task: &str) -> Result<Stage, GraphError> {
        self.plan()?
            .iter()
            .find(|(_, seqs)| seqs.iter().any(|s| s.tasks().any(|t| t == task)))
            .map(|(stage, _)| *stage)
            .ok_or_else(|| GraphError::UnknownTask(task.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.plan()
            .map(|plan| plan.values().flatten().all(|s| s.groups.is_empty()))
            .unwrap_or(true)
    }
}

impl fmt::Display for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plan = match self.plan() {
            Ok(plan) => plan,
            Err(e) => return write!(f, "Invalid workflow: {}", e),
        };
        if self.is_empty() {
            return f.write_str("Empty workflow!");
        }

        let mut first = true;
        for (stage, sequences) in plan {
            if sequences.iter().all(|s| s.groups.is_empty()) {
                continue;
            }
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "{}:", stage)?;
            for sequence in sequences {
                let groups: Vec<String> = sequence
                    .groups
                    .iter()
                    .map(|group| match group.as_slice() {
                        [single] => single.clone(),
                        many => format!("[{}]", many.join(" -> ")),
                    })
                    .collect();
                write!(f, "\n    - {}: {}", sequence.name, groups.join(" // "))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str, tokens: &[&str]) -> SequenceDecl {
        SequenceDecl {
            name: name.to_string(),
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn graph(stages: Vec<(Stage, Vec<SequenceDecl>)>, groups: &[(&str, &[&str])]) -> TaskGraph {
        TaskGraph::new(
            stages.into_iter().collect(),
            groups
                .iter()
                .map(|(g, ts)| (g.to_string(), ts.iter().map(|t| t.to_string()).collect()))
                .collect(),
        )
    }

    #[test]
    fn test_group_expansion() {
        let g = graph(
            vec![(Stage::Cycles, vec![decl("run", &["prep", "model"])])],
            &[("prep", &["fetch", "interp"])],
        );
        let seqs = g.sequences(Stage::Cycles).unwrap();
        assert_eq!(
            seqs[0].groups,
            vec![
                vec!["fetch".to_string(), "interp".to_string()],
                vec!["model".to_string()]
            ]
        );
        assert_eq!(g.tasks().unwrap(), vec!["fetch", "interp", "model"]);
        assert_eq!(g.stage_of("interp").unwrap(), Stage::Cycles);
        assert!(g.stage_of("nope").is_err());
        assert!(g.sequences(Stage::Epilog).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_across_stages() {
        let g = graph(
            vec![
                (Stage::Prolog, vec![decl("init", &["a"])]),
                (Stage::Epilog, vec![decl("end", &["a"])]),
            ],
            &[],
        );
        assert_eq!(
            g.plan().unwrap_err(),
            GraphError::DuplicateTask("a".to_string())
        );
        assert_eq!(
            g.tasks().unwrap_err(),
            GraphError::DuplicateTask("a".to_string())
        );
    }

    #[test]
    fn test_duplicate_through_group() {
        let g = graph(
            vec![(Stage::Cycles, vec![decl("run", &["grp", "b"])])],
            &[("grp", &["a", "b"])],
        );
        assert!(g.plan().is_err());
    }

    #[test]
    fn test_display() {
        let g = graph(
            vec![
                (Stage::Prolog, vec![decl("init", &["setup"])]),
                (
                    Stage::Cycles,
                    vec![decl("run", &["prep", "model"]), decl("post", &["plot"])],
                ),
            ],
            &[("prep", &["fetch", "interp"])],
        );
        assert_eq!(
            g.to_string(),
            "prolog:\n    - init: setup\ncycles:\n    - run: [fetch -> interp] // model\n    - post: plot"
        );
    }

    #[test]
    fn test_empty() {
        let g = TaskGraph::default();
        assert!(g.is_empty());
        assert_eq!(g.to_string(), "Empty workflow!");
    }
}
