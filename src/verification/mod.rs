//! Verification references and the engine that drives them.

mod clock;
mod config;
mod engine;
mod memory;
mod model;
mod postgres;
mod random;
mod store;


pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::config::VerificationConfig;
pub use self::engine::{
    ActionIdentity, ChannelOption, ChannelSelection, ContactUpdate, IssuedToken, Identity,
    NewAccount, VerificationChallenge, VerificationEngine,
};
pub use self::memory::MemoryVerificationStore;
pub use self::model::{
    mask_destination, Channel, ChannelBinding, Objective, ReferenceStatus, VerificationReference,
    ACCESS_SESSION, SET_PASSWORD,
};
pub use self::postgres::PgVerificationStore;
pub use self::random::{OsRandom, SecureRandom};
pub use self::store::VerificationStore;
