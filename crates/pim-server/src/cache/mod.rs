pub mod collection_tree;

pub use collection_tree::{CollectionTreeCache, Depth, TreeScope};
