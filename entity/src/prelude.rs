pub use super::observation::Entity as Observation;
