pub mod prelude;

pub mod observation;
