//! Build version, git metadata and the outbound User-Agent.

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit SHA at build time, or "unknown".
pub const GIT_SHA: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

/// Git branch at build time, or "unknown".
pub const GIT_BRANCH: &str = match option_env!("VERGEN_GIT_BRANCH") {
    Some(branch) => branch,
    None => "unknown",
};

fn short_sha() -> &'static str {
    &GIT_SHA[..GIT_SHA.len().min(7)]
}

/// `{version}+{branch}.{sha}`, with `.dirty` appended for dirty trees.
pub fn version_string() -> String {
    let dirty = option_env!("VERGEN_GIT_DIRTY") == Some("true");
    format!(
        "{PKG_VERSION}+{GIT_BRANCH}.{}{}",
        short_sha(),
        if dirty { ".dirty" } else { "" }
    )
}

/// User-Agent sent with every outbound source fetch.
pub fn user_agent() -> String {
    format!("cardcrafter/{PKG_VERSION} (+{})", short_sha())
}
