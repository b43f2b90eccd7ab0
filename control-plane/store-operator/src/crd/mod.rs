pub mod store;

pub use store::{
    Condition, ConditionStatus, ConditionType, STORE_FINALIZER, Store,
    StorePhase, StoreSpec, StoreStatus,
};
