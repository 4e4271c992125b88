mod arena;
mod handle;
mod node;
mod raw_bplus_tree;
mod validate;

pub(crate) use handle::Handle;
pub(crate) use node::Node;
pub(crate) use raw_bplus_tree::RawBPlusTree;
