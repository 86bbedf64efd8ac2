pub mod context;
pub mod disambiguation;
pub mod engine;
pub mod extractor;
pub mod replies;
pub mod slots;
pub mod states;
pub mod turn;
