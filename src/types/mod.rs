//! Public types for the Cardcrafter API.

mod card;
mod mapping;
mod render;
mod source;

pub use card::{Card, CardId, RESERVED_KEYS};
pub use mapping::{FieldMapping, FieldRole};
pub use render::{DisplayOptions, RenderConfig};
pub use source::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, SourceDescriptor, clamp_page_size};
