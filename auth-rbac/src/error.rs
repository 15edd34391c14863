use database_layer::DatabaseError;
use error_common::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RbacError {
    #[error("Invalid permission '{0}'")]
    InvalidPermission(String),

    #[error("Invalid role id '{0}'")]
    InvalidRole(String),

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Role already exists: {0}")]
    RoleExists(String),

    #[error("System role '{0}' cannot be modified")]
    SystemRole(String),

    #[error("Role '{0}' would inherit from itself")]
    CircularInheritance(String),

    #[error("Principal not found")]
    PrincipalNotFound,

    #[error("Directory error: {0}")]
    Directory(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub type RbacResult<T> = std::result::Result<T, RbacError>;

impl From<RbacError> for CoreError {
    fn from(err: RbacError) -> Self {
        match err {
            RbacError::InvalidPermission(_)
            | RbacError::InvalidRole(_)
            | RbacError::RoleNotFound(_)
            | RbacError::RoleExists(_)
            | RbacError::SystemRole(_)
            | RbacError::CircularInheritance(_)
            | RbacError::PrincipalNotFound => CoreError::validation(err.to_string()),
            RbacError::Directory(_) | RbacError::Database(_) => CoreError::unavailable(err),
        }
    }
}
