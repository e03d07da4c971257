use util::HashMap;

use crate::plan::{ExecutionPlan, PlanEntry};
use crate::resources::Resources;
use crate::task::Task;
use crate::Error;

/// A named unit of work: one task of its own, possibly preceded by others.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    name: String,
    task: Task,
    kind: JobKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobKind {
    /// Just the job's own task.
    Leaf,
    /// Children run before the parent, last-appended first.
    Sequence(Vec<Job>),
    /// Dependencies described by a graph over registered jobs.
    Dag(Dag),
}

/// Registry of dependency jobs plus the graph connecting them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dag {
    registry: HashMap<String, Job>,
    /// vertex -> neighbors, in the order the caller listed them.
    /// `None` until `insert` succeeds.
    edges: Option<HashMap<String, Vec<String>>>,
}

impl Job {
    fn new(name: &str, task: Task, kind: JobKind) -> Self {
        Self {
            name: name.replace(' ', "_"),
            task,
            kind,
        }
    }

    /// A job wrapping a single task. Spaces in `name` become underscores.
    pub fn leaf(name: &str, task: Task) -> Self {
        Self::new(name, task, JobKind::Leaf)
    }

    /// A job whose appended children all run before `task`.
    pub fn sequence(name: &str, task: Task) -> Self {
        Self::new(name, task, JobKind::Sequence(Vec::new()))
    }

    /// A job whose dependencies are given as a graph; see `register_job` and `insert`.
    pub fn dag(name: &str, task: Task) -> Self {
        Self::new(name, task, JobKind::Dag(Dag::default()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    pub fn is_composite(&self) -> bool {
        !matches!(self.kind, JobKind::Leaf)
    }

    /// Add a child to a sequence.
    pub fn append(&mut self, job: Job) -> Result<(), Error> {
        match &mut self.kind {
            JobKind::Sequence(children) => {
                children.push(job);
                Ok(())
            }
            _ => Err(Error::NotASequence(self.name.clone())),
        }
    }

    /// Make `job` available as a vertex of this DAG.
    pub fn register_job(&mut self, job: Job) -> Result<(), Error> {
        let dag = match &mut self.kind {
            JobKind::Dag(dag) => dag,
            _ => return Err(Error::NotADag(self.name.clone())),
        };
        if job.name == self.name || dag.registry.contains_key(&job.name) {
            return Err(Error::DuplicateJob {
                dag: self.name.clone(),
                job: job.name,
            });
        }
        dag.registry.insert(job.name.clone(), job);
        Ok(())
    }

    /// Set the dependency graph of a DAG job: each vertex maps to the
    /// vertices it depends on, and a vertex without dependencies maps to
    /// an empty list. The graph is fully validated here: the root must
    /// be a vertex, every other vertex must be registered, every
    /// dependency must itself be a vertex, and there must be no cycles.
    pub fn insert<I, K, V>(&mut self, graph: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        let dag = match &mut self.kind {
            JobKind::Dag(dag) => dag,
            _ => return Err(Error::NotADag(self.name.clone())),
        };

        let mut edges: HashMap<String, Vec<String>> = HashMap::default();
        for (vertex, neighbors) in graph {
            let vertex = vertex.into();
            let neighbors = neighbors.into_iter().map(Into::into).collect();
            if edges.contains_key(&vertex) {
                return Err(Error::DuplicateVertex(vertex));
            }
            edges.insert(vertex, neighbors);
        }

        if !edges.contains_key(&self.name) {
            return Err(Error::MissingRoot(self.name.clone()));
        }
        for (vertex, neighbors) in &edges {
            if *vertex != self.name && !dag.registry.contains_key(vertex) {
                return Err(Error::UnregisteredVertex(vertex.clone()));
            }
            if let Some(missing) = neighbors.iter().find(|n| !edges.contains_key(*n)) {
                return Err(Error::MissingVertex {
                    vertex: vertex.clone(),
                    neighbor: missing.clone(),
                });
            }
        }

        // every vertex, not only those reachable from the root:
        let mut marks = HashMap::default();
        let mut order = Vec::with_capacity(edges.len());
        let mut vertices: Vec<&str> = edges.keys().map(String::as_str).collect();
        vertices.sort_unstable();
        for vertex in vertices {
            post_order(&edges, vertex, &mut marks, &mut order)?;
        }
        log::trace!("graph for {} is acyclic: {:?}", self.name, order);

        dag.edges = Some(edges);
        Ok(())
    }

    /// Flatten this job into the ordered list of tasks to execute.
    pub fn resolve(&self) -> Result<ExecutionPlan<'_>, Error> {
        let mut entries = Vec::with_capacity(8);
        self.extend_plan(&mut entries)?;
        Ok(ExecutionPlan::new(entries))
    }

    /// Alias for `resolve`.
    pub fn execute_command(&self) -> Result<ExecutionPlan<'_>, Error> {
        self.resolve()
    }

    /// Field-wise maximum resources over every task this job runs.
    pub fn max_resources(&self) -> Result<Resources, Error> {
        Ok(self.resolve()?.max_resources())
    }

    /// Sum of wall times over every task this job runs,
    /// or `None` if any of them has no wall time.
    pub fn max_wall_time(&self) -> Result<Option<f64>, Error> {
        Ok(self.resolve()?.total_wall_time())
    }

    /// Number of tasks this job runs.
    pub fn number_tasks(&self) -> Result<usize, Error> {
        Ok(self.resolve()?.len())
    }

    fn own_entry(&self) -> PlanEntry<'_> {
        PlanEntry {
            name: &self.name,
            task: &self.task,
        }
    }

    fn extend_plan<'a>(&'a self, entries: &mut Vec<PlanEntry<'a>>) -> Result<(), Error> {
        match &self.kind {
            JobKind::Leaf => {}
            JobKind::Sequence(children) => {
                for child in children.iter().rev() {
                    child.extend_plan(entries)?;
                }
            }
            JobKind::Dag(dag) => {
                let edges = dag
                    .edges
                    .as_ref()
                    .ok_or_else(|| Error::MissingGraph(self.name.clone()))?;
                let mut marks = HashMap::default();
                let mut order = Vec::with_capacity(edges.len());
                post_order(edges, &self.name, &mut marks, &mut order)?;
                for vertex in order {
                    if vertex == self.name {
                        continue;
                    }
                    let job = dag
                        .registry
                        .get(vertex)
                        .ok_or_else(|| Error::UnregisteredVertex(vertex.to_owned()))?;
                    job.extend_plan(entries)?;
                }
            }
        }
        entries.push(self.own_entry());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Depth-first walk from `start`, appending each vertex after all of its
/// neighbors. Neighbors are visited in the order given; a vertex that is
/// already done is skipped, so shared dependencies appear once.
fn post_order<'a>(
    edges: &'a HashMap<String, Vec<String>>,
    start: &'a str,
    marks: &mut HashMap<&'a str, Mark>,
    order: &mut Vec<&'a str>,
) -> Result<(), Error> {
    if marks.contains_key(start) {
        return Ok(());
    }
    marks.insert(start, Mark::InProgress);
    let mut stack: Vec<(&'a str, usize)> = vec![(start, 0)];

    while let Some(top) = stack.last_mut() {
        let (vertex, next) = *top;
        top.1 += 1;

        let neighbors = edges.get(vertex).ok_or_else(|| Error::MissingVertex {
            vertex: vertex.to_owned(),
            neighbor: vertex.to_owned(),
        })?;

        match neighbors.get(next) {
            Some(neighbor) => match marks.get(neighbor.as_str()) {
                Some(Mark::Done) => {}
                Some(Mark::InProgress) => return Err(Error::Cycle(neighbor.clone())),
                None => {
                    marks.insert(neighbor.as_str(), Mark::InProgress);
                    stack.push((neighbor.as_str(), 0));
                }
            },
            None => {
                stack.pop();
                marks.insert(vertex, Mark::Done);
                order.push(vertex);
            }
        }
    }
    Ok(())
}
