#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod formatting;
pub mod rag_chain;
pub mod retrieve;
pub mod rewrite;

pub use rag_chain::RagChain;
pub use retrieve::RetrieverParams;
