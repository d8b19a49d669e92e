pub mod balancer;

pub use balancer::{
    Algorithm, Destination, DestinationStats, Selector, SelectorStats, WeightedRoundRobin,
    DEFAULT_WEIGHT,
};
