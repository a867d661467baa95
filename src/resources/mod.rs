pub mod common;
pub mod naming;
pub mod secret;
pub mod volume;

pub use common::{
    owner_reference, standard_labels, API_VERSION, FIELD_MANAGER, KIND, LABEL_CLUSTER,
    LABEL_INSTANCE, LABEL_INSTANCE_SET, LABEL_PGUSER, LABEL_ROLE,
};
pub use secret::generate_user_secret;
