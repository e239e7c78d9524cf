use crate::messages::MessageKey;
use std::fmt;
use vessel_common::{Biome, EntityId, Profession, merchant_title};
use vessel_persist::Snapshot;

/// What the actor is shown after a committed capture or release.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// The merchant that was removed (capture) or spawned (release).
    pub entity: EntityId,
    pub profession: Profession,
    pub biome: Biome,
    pub level: u8,
    pub trades: usize,
}

impl Summary {
    pub fn of(entity: EntityId, snapshot: &Snapshot) -> Self {
        Self {
            entity,
            profession: snapshot.variant_kind,
            biome: snapshot.biome_variant,
            level: snapshot.level,
            trades: snapshot.trade_count(),
        }
    }

    pub fn title(&self) -> String {
        merchant_title(self.biome, self.profession)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (level {}, {} trades)",
            self.title(),
            self.level,
            self.trades
        )
    }
}

/// Misuse of a filled container that is answered with a hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guidance {
    /// A filled container was used on a merchant.
    UseEmptyContainer,
    /// A filled container was used on some other entity.
    ReleaseOnly,
    /// A filled container was used on thin air.
    ClickBlock,
}

/// Why a flow stopped without committing.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    NoPermission,
    NoReleasePermission,
    TargetInvalid,
    TargetOwned,
    WorldDisabled,
    ClaimDenied,
    /// The item is not a filled container.
    NotAContainer,
    /// The embedded snapshot is unreadable or misses required fields.
    IncompleteSnapshot,
    LiquidSurface,
    TooFast,
    /// The container left the actor's hand while the flow ran.
    ContainerGone,
    /// Another attempt on the same target is already running. Never shown.
    DuplicateInFlight,
    Misuse(Guidance),
}

impl Rejection {
    /// Message for the actor, or `None` for drops that stay silent.
    pub fn message_key(&self) -> Option<MessageKey> {
        Some(match self {
            Self::NoPermission => MessageKey::NoPermission,
            Self::NoReleasePermission => MessageKey::NoPermissionRelease,
            Self::TargetInvalid => MessageKey::InvalidTarget,
            Self::TargetOwned => MessageKey::TargetOwned,
            Self::WorldDisabled => MessageKey::WorldDisabled,
            Self::ClaimDenied => MessageKey::ClaimDenied,
            Self::NotAContainer | Self::ContainerGone => MessageKey::ContainerAlreadyUsed,
            Self::IncompleteSnapshot => MessageKey::IncompleteSnapshot,
            Self::LiquidSurface => MessageKey::CannotPlaceInFluid,
            Self::TooFast => MessageKey::TooFast,
            Self::DuplicateInFlight => return None,
            Self::Misuse(Guidance::UseEmptyContainer) => MessageKey::UseEmptyContainer,
            Self::Misuse(Guidance::ReleaseOnly) => MessageKey::ReleaseOnly,
            Self::Misuse(Guidance::ClickBlock) => MessageKey::ClickBlock,
        })
    }

    pub fn is_silent(&self) -> bool {
        self.message_key().is_none()
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message_key() {
            Some(key) => write!(f, "{key}"),
            None => f.write_str("duplicate-in-flight"),
        }
    }
}

/// Terminal state of one capture or release flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Committed(Summary),
    Rejected(Rejection),
    Failed(String),
}

impl Outcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Committed(summary) => write!(f, "committed: {summary}"),
            Self::Rejected(reason) => write!(f, "rejected: {reason}"),
            Self::Failed(cause) => write!(f, "failed: {cause}"),
        }
    }
}
