use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum RegistryError {
    #[error("Duplicate Type Id Error: {type_id} claimed by {existing} and {name} {location}")]
    DuplicateId {
        type_id: u32,
        existing: &'static str,
        name: &'static str,
        location: ErrorLocation,
    },

    #[error("Duplicate Shape Error: {name} registered twice {location}")]
    DuplicateShape {
        name: &'static str,
        location: ErrorLocation,
    },

    #[error("Reserved Type Id Error: {name} uses internal id {type_id} {location}")]
    ReservedId {
        type_id: u32,
        name: &'static str,
        location: ErrorLocation,
    },

    #[error("Sign-In Registration Error: {name} must be registered with register_sign_in {location}")]
    SignInAccessorMissing {
        name: &'static str,
        location: ErrorLocation,
    },
}
