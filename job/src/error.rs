use crate::resources::Resource;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Unknown resource \"{0}\"; valid resources are: {names}", names = Resource::NAMES.join(", "))]
    UnknownResource(String),
    #[error("Resource \"{0}\" was specified more than once")]
    ResourceAlreadySet(Resource),
    #[error("Resource \"{0}\" must be at least 1, got {1}")]
    InvalidResourceValue(Resource, u32),
    #[error("A task needs a command to run")]
    EmptyCommand,
    #[error("Wall time must be a positive number of minutes, got {0}")]
    InvalidWallTime(f64),
    #[error("Job \"{0}\" is not a sequence")]
    NotASequence(String),
    #[error("Job \"{0}\" is not a DAG")]
    NotADag(String),
    #[error("Job \"{job}\" is already registered with DAG \"{dag}\"")]
    DuplicateJob { dag: String, job: String },
    #[error("DAG \"{0}\" has no dependency graph; call insert() first")]
    MissingGraph(String),
    #[error("Dependency graph of \"{0}\" has no entry for its root")]
    MissingRoot(String),
    #[error("Vertex \"{0}\" appears twice in the dependency graph")]
    DuplicateVertex(String),
    #[error("Vertex \"{0}\" in the dependency graph is not a registered job")]
    UnregisteredVertex(String),
    #[error("\"{neighbor}\" (a dependency of \"{vertex}\") has no entry in the dependency graph; map leaves to an empty list")]
    MissingVertex { vertex: String, neighbor: String },
    #[error("Dependency graph has a cycle through \"{0}\"")]
    Cycle(String),
}
