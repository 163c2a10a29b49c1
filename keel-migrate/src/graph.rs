//! Dependency graph construction and execution ordering.
//!
//! Each reference a script holds is matched to the lexically earliest
//! script at or before it that creates the referenced object. When no
//! earlier creator exists, the earliest later creator is used instead and a
//! warning is recorded; this forward edge is what lets genuinely circular
//! designs surface as cycles instead of silently misordering.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::analyze::SchemaObject;
use crate::error::{MigrateResult, MigrationError};
use crate::file::MigrationScript;

/// Scripts in execution order, with their dependencies resolved.
#[derive(Debug, Clone)]
pub struct ResolvedPlan {
    /// Scripts in the order they must execute.
    pub scripts: Vec<MigrationScript>,
    /// Advisory warnings from analysis and resolution.
    pub warnings: Vec<String>,
}

impl ResolvedPlan {
    /// Filenames in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.scripts.iter().map(|s| s.filename.as_str()).collect()
    }

    /// Look up a script by filename.
    pub fn get(&self, filename: &str) -> Option<&MigrationScript> {
        self.scripts.iter().find(|s| s.filename == filename)
    }

    /// Number of scripts in the plan.
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Check whether the plan has no scripts.
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

/// Directed graph from scripts to the scripts they depend on.
#[derive(Debug)]
pub struct DependencyGraph {
    scripts: BTreeMap<String, MigrationScript>,
    edges: BTreeMap<String, BTreeSet<String>>,
    warnings: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl DependencyGraph {
    /// Build the graph for a set of scripts.
    pub fn build(scripts: Vec<MigrationScript>) -> Self {
        let scripts: BTreeMap<String, MigrationScript> = scripts
            .into_iter()
            .map(|s| (s.filename.clone(), s))
            .collect();

        let mut creators: BTreeMap<&SchemaObject, Vec<&str>> = BTreeMap::new();
        for script in scripts.values() {
            for object in &script.creates {
                creators.entry(object).or_default().push(&script.filename);
            }
        }

        let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut warnings = Vec::new();

        for script in scripts.values() {
            let deps = edges.entry(script.filename.clone()).or_default();
            warnings.extend(script.warnings.iter().cloned());

            for reference in &script.references {
                match find_creator(&creators, &script.filename, reference) {
                    Some(Creator::Earlier(creator)) => {
                        deps.insert(creator.to_string());
                    }
                    Some(Creator::Later(creator)) => {
                        deps.insert(creator.to_string());
                        if !script.idempotent {
                            warnings.push(format!(
                                "{}: references {} which is only created by later script {}",
                                script.filename, reference, creator
                            ));
                        }
                    }
                    None => {
                        if !script.idempotent {
                            warnings.push(format!(
                                "{}: no managed script creates {} (assumed to exist already)",
                                script.filename, reference
                            ));
                        }
                    }
                }
            }

            debug!(script = %script.filename, dependencies = ?deps, "Resolved dependencies");
        }

        for message in &warnings {
            warn!("{}", message);
        }

        Self {
            scripts,
            edges,
            warnings,
        }
    }

    /// Direct dependencies of a script.
    pub fn dependencies(&self, filename: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(filename)
    }

    /// Advisory warnings gathered while building the graph.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Compute the execution order with a depth-first topological sort.
    ///
    /// Nodes and their dependencies are visited in filename order, so the
    /// result is deterministic. A cycle is reported with its full chain.
    pub fn execution_order(&self) -> MigrateResult<Vec<String>> {
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
        let mut stack: Vec<&str> = Vec::new();
        let mut order = Vec::with_capacity(self.scripts.len());

        for filename in self.scripts.keys() {
            self.visit(filename, &mut marks, &mut stack, &mut order)?;
        }

        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        marks: &mut BTreeMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
        order: &mut Vec<String>,
    ) -> MigrateResult<()> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(node.to_string());
                return Err(MigrationError::CircularDependency(cycle));
            }
            None => {}
        }

        marks.insert(node, Mark::Visiting);
        stack.push(node);

        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                self.visit(dep, marks, stack, order)?;
            }
        }

        stack.pop();
        marks.insert(node, Mark::Done);
        order.push(node.to_string());
        Ok(())
    }

    /// Order the scripts, attaching their dependencies.
    pub fn resolve(mut self) -> MigrateResult<ResolvedPlan> {
        let order = self.execution_order()?;
        let mut scripts = Vec::with_capacity(order.len());

        for filename in order {
            if let Some(mut script) = self.scripts.remove(&filename) {
                script.dependencies = self.edges.remove(&filename).unwrap_or_default();
                scripts.push(script);
            }
        }

        Ok(ResolvedPlan {
            scripts,
            warnings: self.warnings,
        })
    }
}

/// Build the graph and resolve the execution order in one step.
pub fn resolve(scripts: Vec<MigrationScript>) -> MigrateResult<ResolvedPlan> {
    DependencyGraph::build(scripts).resolve()
}

enum Creator<'a> {
    Earlier(&'a str),
    Later(&'a str),
}

fn find_creator<'a>(
    creators: &BTreeMap<&SchemaObject, Vec<&'a str>>,
    filename: &str,
    reference: &SchemaObject,
) -> Option<Creator<'a>> {
    let table = SchemaObject::table(reference.table_name());
    let mut candidates = vec![creators.get(reference)];
    if matches!(reference, SchemaObject::Column { .. }) {
        candidates.push(creators.get(&table));
    }

    for names in candidates.into_iter().flatten() {
        // `names` is in filename order.
        if let Some(earlier) = names.iter().copied().find(|n| *n < filename) {
            return Some(Creator::Earlier(earlier));
        }
        if let Some(later) = names.iter().copied().find(|n| *n > filename) {
            return Some(Creator::Later(later));
        }
    }

    None
}
