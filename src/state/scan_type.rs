use std::fmt;

/// Crawl strategy used for a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanType {
    /// Lightweight single-request fetch
    Fast,

    /// Full render, including the page's external scripts
    Deep,
}

/// Kind of crawl worker that produced a scan's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerType {
    Fetcher,
    Renderer,
}

impl ScanType {
    /// The worker type that executes this strategy
    pub fn worker_type(&self) -> WorkerType {
        match self {
            Self::Fast => WorkerType::Fetcher,
            Self::Deep => WorkerType::Renderer,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Fast => "FAST",
            Self::Deep => "DEEP",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "FAST" => Some(Self::Fast),
            "DEEP" => Some(Self::Deep),
            _ => None,
        }
    }
}

impl WorkerType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Fetcher => "FETCHER",
            Self::Renderer => "RENDERER",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "FETCHER" => Some(Self::Fetcher),
            "RENDERER" => Some(Self::Renderer),
            _ => None,
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
