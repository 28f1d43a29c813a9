// Commerce transaction entities
pub mod commerce;
