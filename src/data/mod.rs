pub mod batches;
pub mod kind;
pub mod labels;
pub mod normalize;
