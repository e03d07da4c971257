use std::fmt;
use std::str::FromStr;

use crate::Error;

/// The resource categories a task can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    MpiRanks,
    Threads,
}

impl Resource {
    /// Every textual alias accepted by `from_str`.
    pub const NAMES: &'static [&'static str] = &[
        "ranks",
        "Ranks",
        "mpiranks",
        "MPIRanks",
        "threads",
        "ompthreads",
    ];
}

impl FromStr for Resource {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ranks" | "Ranks" | "mpiranks" | "MPIRanks" => Ok(Self::MpiRanks),
            "threads" | "ompthreads" => Ok(Self::Threads),
            _ => Err(Error::UnknownResource(s.to_owned())),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MpiRanks => write!(f, "mpiranks"),
            Self::Threads => write!(f, "threads"),
        }
    }
}

/// Resources held by a task, or aggregated over a whole job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resources {
    pub mpiranks: u32,
    pub threads: u32,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            mpiranks: 1,
            threads: 1,
        }
    }
}

impl Resources {
    pub fn get(&self, resource: Resource) -> u32 {
        match resource {
            Resource::MpiRanks => self.mpiranks,
            Resource::Threads => self.threads,
        }
    }

    /// Field-wise maximum.
    pub fn max(self, other: Self) -> Self {
        Self {
            mpiranks: self.mpiranks.max(other.mpiranks),
            threads: self.threads.max(other.threads),
        }
    }
}

/// Builder for a validated set of resource assignments.
/// Each category may be set at most once, to a value of at least 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRequest {
    mpiranks: Option<u32>,
    threads: Option<u32>,
}

impl ResourceRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ranks(self, ranks: u32) -> Result<Self, Error> {
        self.set(Resource::MpiRanks, ranks)
    }

    pub fn with_threads(self, threads: u32) -> Result<Self, Error> {
        self.set(Resource::Threads, threads)
    }

    pub fn set(mut self, resource: Resource, value: u32) -> Result<Self, Error> {
        if value == 0 {
            return Err(Error::InvalidResourceValue(resource, value));
        }
        let slot = match resource {
            Resource::MpiRanks => &mut self.mpiranks,
            Resource::Threads => &mut self.threads,
        };
        if slot.is_some() {
            return Err(Error::ResourceAlreadySet(resource));
        }
        *slot = Some(value);
        Ok(self)
    }

    /// Build a request from textual `(name, value)` pairs, e.g. from a suite file.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (&'a str, u32)>,
    {
        pairs
            .into_iter()
            .try_fold(Self::new(), |req, (name, value)| req.set(name.parse()?, value))
    }

    pub(crate) fn apply(&self, resources: &mut Resources) {
        if let Some(ranks) = self.mpiranks {
            resources.mpiranks = ranks;
        }
        if let Some(threads) = self.threads {
            resources.threads = threads;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        for name in ["ranks", "Ranks", "mpiranks", "MPIRanks"] {
            assert_eq!(name.parse::<Resource>(), Ok(Resource::MpiRanks));
        }
        assert_eq!("ompthreads".parse::<Resource>(), Ok(Resource::Threads));
        let err = "gpus".parse::<Resource>().unwrap_err();
        assert_eq!(err, Error::UnknownResource("gpus".into()));
        assert!(err.to_string().contains("ompthreads"));
    }

    #[test]
    fn test_set_once_per_category() {
        let req = ResourceRequest::new().with_ranks(4).unwrap();
        assert_eq!(
            req.clone().with_ranks(2),
            Err(Error::ResourceAlreadySet(Resource::MpiRanks))
        );
        let req = req.with_threads(2).unwrap();
        let mut res = Resources::default();
        req.apply(&mut res);
        assert_eq!(res, Resources { mpiranks: 4, threads: 2 });
    }

    #[test]
    fn test_from_pairs_rejects_alias_duplicates() {
        let err = ResourceRequest::from_pairs([("ranks", 2), ("mpiranks", 3)]).unwrap_err();
        assert_eq!(err, Error::ResourceAlreadySet(Resource::MpiRanks));
        assert!(ResourceRequest::from_pairs([("cores", 2)]).is_err());
    }

    #[test]
    fn test_zero_rejected() {
        assert_eq!(
            ResourceRequest::new().with_threads(0),
            Err(Error::InvalidResourceValue(Resource::Threads, 0))
        );
    }

    #[test]
    fn test_max() {
        let a = Resources { mpiranks: 4, threads: 1 };
        let b = Resources { mpiranks: 2, threads: 8 };
        assert_eq!(a.max(b), Resources { mpiranks: 4, threads: 8 });
    }
}
