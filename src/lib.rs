pub mod agent;
pub mod brain;
pub mod config;
pub mod morphology;
pub mod population;
pub mod sandbox;
pub mod save_load;
pub mod sim;
pub mod stats;
