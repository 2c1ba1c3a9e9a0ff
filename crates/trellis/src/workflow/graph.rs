//! Job dependency graph.

use super::Job;
use crate::{Error, Result};
use petgraph::{
  algo::toposort,
  graph::{DiGraph, NodeIndex},
  Direction,
};
use std::collections::HashMap;

/// DAG of jobs. Edges point from a dependency to its dependent.
#[derive(Debug, Clone)]
pub struct JobGraph {
  graph: DiGraph<String, ()>,
  indices: HashMap<String, NodeIndex>,
  order: Vec<String>,
}

impl JobGraph {
  /// Fails on duplicate job keys, `needs` naming an undeclared job, or any
  /// cycle (self-dependencies included).
  pub fn build(jobs: &[Job]) -> Result<JobGraph> {
    if jobs.is_empty() {
      return Err(Error::configuration_error(
        "Workflow must have at least one job",
      ));
    }

    let mut graph = DiGraph::new();
    let mut indices = HashMap::new();

    for job in jobs {
      let idx = graph.add_node(job.key.clone());
      if indices.insert(job.key.clone(), idx).is_some() {
        return Err(Error::configuration_error(format!(
          "Job `{}` is declared more than once",
          job.key
        )));
      }
    }

    for job in jobs {
      let job_idx = indices[&job.key];
      for dependency in &job.needs {
        let dependency_idx = indices.get(dependency).ok_or_else(|| {
          Error::configuration_error(format!(
            "Job `{}` needs job `{}`, but job `{}` is not defined",
            job.key, dependency, dependency
          ))
        })?;
        graph.update_edge(*dependency_idx, job_idx, ());
      }
    }

    let order = toposort(&graph, None)
      .map_err(|cycle| {
        Error::configuration_error(format!(
          "Job dependency cycle detected involving `{}`",
          graph[cycle.node_id()]
        ))
      })?
      .into_iter()
      .map(|idx| graph[idx].clone())
      .collect();

    Ok(JobGraph {
      graph,
      indices,
      order,
    })
  }

  /// Jobs with no `needs`, in declaration order.
  pub fn roots(&self) -> Vec<&str> {
    self
      .graph
      .node_indices()
      .filter(|idx| {
        self
          .graph
          .neighbors_directed(*idx, Direction::Incoming)
          .next()
          .is_none()
      })
      .map(|idx| self.graph[idx].as_str())
      .collect()
  }

  /// Jobs `key` needs, in declaration order.
  pub fn dependencies(&self, key: &str) -> Vec<&str> {
    self.neighbors(key, Direction::Incoming)
  }

  /// Jobs that need `key`, in declaration order.
  pub fn dependents(&self, key: &str) -> Vec<&str> {
    self.neighbors(key, Direction::Outgoing)
  }

  /// Every dependency is listed before its dependents.
  pub fn topological_order(&self) -> &[String] {
    &self.order
  }

  fn neighbors(&self, key: &str, direction: Direction) -> Vec<&str> {
    let Some(&idx) = self.indices.get(key) else {
      return vec![];
    };

    // Node indices follow declaration order
    let mut neighbors: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
    neighbors.sort_unstable();
    neighbors
      .into_iter()
      .map(|n| self.graph[n].as_str())
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Job;

  fn job(key: &str, needs: &[&str]) -> Job {
    Job {
      needs: needs.iter().map(|n| n.to_string()).collect(),
      ..Job::stub(key)
    }
  }

  fn position(graph: &JobGraph, key: &str) -> usize {
    graph
      .topological_order()
      .iter()
      .position(|k| k == key)
      .unwrap()
  }

  #[test]
  fn diamond() {
    let graph = JobGraph::build(&[
      job("build", &[]),
      job("test", &["build"]),
      job("lint", &["build"]),
      job("deploy", &["test", "lint"]),
    ])
    .unwrap();

    assert_eq!(graph.roots(), vec!["build"]);
    assert_eq!(graph.dependents("build"), vec!["test", "lint"]);
    assert_eq!(graph.dependencies("deploy"), vec!["test", "lint"]);
    assert!(graph.dependents("deploy").is_empty());
    assert!(position(&graph, "build") < position(&graph, "test"));
    assert!(position(&graph, "lint") < position(&graph, "deploy"));
  }

  #[test]
  fn roots_in_declaration_order() {
    let graph = JobGraph::build(&[
      job("lint", &[]),
      job("test", &["lint", "build"]),
      job("build", &[]),
      job("audit", &[]),
    ])
    .unwrap();

    assert_eq!(graph.roots(), vec!["lint", "build", "audit"]);
    assert_eq!(graph.dependencies("test"), vec!["lint", "build"]);
  }

  #[test]
  fn two_job_cycle() {
    let err = JobGraph::build(&[job("a", &["b"]), job("b", &["a"])]).unwrap_err();

    assert!(matches!(err, Error::ConfigurationError(_)));
    assert!(err.to_string().contains("cycle"));
  }

  #[test]
  fn longer_cycle_behind_a_root() {
    let err = JobGraph::build(&[
      job("root", &[]),
      job("a", &["root", "c"]),
      job("b", &["a"]),
      job("c", &["b"]),
    ])
    .unwrap_err();

    assert!(err.to_string().contains("cycle"));
  }

  #[test]
  fn self_dependency() {
    let err = JobGraph::build(&[job("a", &["a"])]).unwrap_err();

    assert_eq!(
      err,
      Error::configuration_error("Job dependency cycle detected involving `a`")
    );
  }

  #[test]
  fn missing_dependency() {
    let err = JobGraph::build(&[job("a", &["ghost"])]).unwrap_err();

    assert_eq!(
      err,
      Error::configuration_error("Job `a` needs job `ghost`, but job `ghost` is not defined")
    );
  }

  #[test]
  fn duplicate_and_empty() {
    assert!(JobGraph::build(&[job("a", &[]), job("a", &[])]).is_err());
    assert!(JobGraph::build(&[]).is_err());
  }
}
