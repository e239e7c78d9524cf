use std::collections::BTreeMap;
use std::fmt;

/// Every user-visible message the flows can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Captured,
    Released,
    NoPermission,
    NoPermissionRelease,
    InvalidTarget,
    TargetOwned,
    WorldDisabled,
    ClaimDenied,
    CannotPlaceInFluid,
    TooFast,
    IncompleteSnapshot,
    ContainerAlreadyUsed,
    InventoryFull,
    UseEmptyContainer,
    ReleaseOnly,
    ClickBlock,
    Failed,
}

impl MessageKey {
    pub const ALL: [MessageKey; 17] = [
        Self::Captured,
        Self::Released,
        Self::NoPermission,
        Self::NoPermissionRelease,
        Self::InvalidTarget,
        Self::TargetOwned,
        Self::WorldDisabled,
        Self::ClaimDenied,
        Self::CannotPlaceInFluid,
        Self::TooFast,
        Self::IncompleteSnapshot,
        Self::ContainerAlreadyUsed,
        Self::InventoryFull,
        Self::UseEmptyContainer,
        Self::ReleaseOnly,
        Self::ClickBlock,
        Self::Failed,
    ];

    /// Identifier used for overrides in the configuration file.
    pub fn id(self) -> &'static str {
        match self {
            Self::Captured => "captured",
            Self::Released => "released",
            Self::NoPermission => "no-permission",
            Self::NoPermissionRelease => "no-permission-release",
            Self::InvalidTarget => "invalid-target",
            Self::TargetOwned => "target-owned",
            Self::WorldDisabled => "world-disabled",
            Self::ClaimDenied => "claim-denied",
            Self::CannotPlaceInFluid => "cannot-place-in-fluid",
            Self::TooFast => "too-fast",
            Self::IncompleteSnapshot => "incomplete-snapshot",
            Self::ContainerAlreadyUsed => "container-already-used",
            Self::InventoryFull => "inventory-full",
            Self::UseEmptyContainer => "use-empty-container",
            Self::ReleaseOnly => "release-only",
            Self::ClickBlock => "click-block",
            Self::Failed => "failed",
        }
    }

    fn default_template(self) -> &'static str {
        match self {
            Self::Captured => "Captured {0}!",
            Self::Released => "Released {0}!",
            Self::NoPermission => "You do not have permission to capture merchants.",
            Self::NoPermissionRelease => "You do not have permission to release merchants.",
            Self::InvalidTarget => "This merchant is no longer valid, try another one.",
            Self::TargetOwned => "This merchant already has an owner.",
            Self::WorldDisabled => "Merchant vessels are disabled in this world.",
            Self::ClaimDenied => "You cannot do that inside this claim.",
            Self::CannotPlaceInFluid => "You cannot release a merchant into a fluid.",
            Self::TooFast => "Slow down, wait a moment before trying again.",
            Self::IncompleteSnapshot => {
                "This vessel's data is incomplete or damaged and cannot be released."
            }
            Self::ContainerAlreadyUsed => "That vessel has already been used.",
            Self::InventoryFull => "Your inventory is full, the item was dropped at your feet.",
            Self::UseEmptyContainer => "Use an empty bucket to capture a merchant.",
            Self::ReleaseOnly => "A filled vessel can only be used to release its merchant.",
            Self::ClickBlock => "Right-click a block to release the merchant.",
            Self::Failed => "Something went wrong, please try again.",
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Turns message keys into text. Templates use positional `{0}`, `{1}`
/// placeholders; overrides replace the built-in English text per key.
#[derive(Debug, Clone, Default)]
pub struct Messages {
    overrides: BTreeMap<String, String>,
}

impl Messages {
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        for id in overrides.keys() {
            if !MessageKey::ALL.iter().any(|k| k.id() == id) {
                tracing::warn!(%id, "unknown message override ignored");
            }
        }
        Self { overrides }
    }

    pub fn resolve(&self, key: MessageKey, args: &[&str]) -> String {
        let template = self
            .overrides
            .get(key.id())
            .map(String::as_str)
            .unwrap_or_else(|| key.default_template());
        format_positional(template, args)
    }
}

fn format_positional(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let arg = after
            .find('}')
            .and_then(|close| Some((after[..close].parse::<usize>().ok()?, close)));
        match arg {
            Some((index, close)) => {
                out.push_str(args.get(index).copied().unwrap_or(""));
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_placeholders() {
        let messages = Messages::default();
        assert_eq!(
            messages.resolve(MessageKey::Captured, &["Plains Farmer"]),
            "Captured Plains Farmer!"
        );
        assert_eq!(
            messages.resolve(MessageKey::Released, &[]),
            "Released !"
        );
    }

    #[test]
    fn overrides_win_and_keep_literal_braces() {
        let mut overrides = BTreeMap::new();
        overrides.insert("released".to_string(), "{0} is free {at last} ({1})".to_string());
        let messages = Messages::new(overrides);
        assert_eq!(
            messages.resolve(MessageKey::Released, &["Desert Merchant", "2 trades"]),
            "Desert Merchant is free {at last} (2 trades)"
        );
        assert_eq!(
            messages.resolve(MessageKey::TooFast, &[]),
            "Slow down, wait a moment before trying again."
        );
    }

    #[test]
    fn ids_are_unique() {
        let mut ids: Vec<_> = MessageKey::ALL.iter().map(|k| k.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), MessageKey::ALL.len());
    }
}
