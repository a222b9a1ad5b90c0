pub mod index;
pub mod scan;
pub mod status;
pub mod suggest;
