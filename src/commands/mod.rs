pub mod extract;
pub mod reconcile;
