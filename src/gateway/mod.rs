//! Service façade

mod builder;
mod service;

pub use builder::{CardCrafter, CardCrafterBuilder};
pub use service::{
    CardService, NO_POSTS_MESSAGE, PROXY_FETCH_ACTION, ProxyBody, ProxyRequest, ProxyResponse,
    WP_QUERY_CACHE_PREFIX,
};
