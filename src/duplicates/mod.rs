pub mod grouper;
pub mod hasher;
pub mod resolver;

pub use grouper::{find_duplicates, DuplicateGroup, DuplicateReport};
pub use resolver::{redundant_members, ResolvedDuplicates};
