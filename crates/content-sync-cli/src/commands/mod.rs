pub mod cat;
pub mod format;
pub mod orphans;
pub mod publish;
pub mod remote;
pub mod repo;
pub mod sync;
