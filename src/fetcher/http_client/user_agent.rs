//! Desktop browser user agents.
//!
//! Storefronts serve mobile layouts, or block outright, for unfamiliar
//! agents, so requests present themselves as a current desktop browser.

/// Desktop agents picked from when impersonating.
pub const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36 Edg/134.0.0.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:136.0) Gecko/20100101 Firefox/136.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.3 Safari/605.1.15",
];

/// Pick a desktop agent. The choice only needs to vary between processes.
pub fn random_user_agent() -> &'static str {
    let seed = uuid::Uuid::new_v4().as_u128() as usize;
    DESKTOP_USER_AGENTS[seed % DESKTOP_USER_AGENTS.len()]
}

/// Resolve the configured agent. Unset, blank or `impersonate` pick a
/// desktop agent; anything else is sent as is.
pub fn resolve_user_agent(configured: Option<&str>) -> String {
    match configured.map(str::trim) {
        None | Some("") | Some("impersonate") => random_user_agent().to_string(),
        Some(custom) => custom.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impersonation_uses_desktop_agent() {
        for configured in [None, Some("impersonate"), Some("  ")] {
            let agent = resolve_user_agent(configured);
            assert!(DESKTOP_USER_AGENTS.contains(&agent.as_str()));
        }
    }

    #[test]
    fn test_custom_agent_kept() {
        assert_eq!(resolve_user_agent(Some("PriceBot/2.0")), "PriceBot/2.0");
    }
}
