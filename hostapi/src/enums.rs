//! Fixed lookup tables for small closed string enumerations.
//!
//! The module passes these as small integers; the bridge maps them to their
//! canonical text without encoding a string on every call.

/// Identifies one of the fixed string tables. The discriminant is the id the
/// module passes across the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StringEnum {
    BinaryType = 0,
    ReferrerPolicy = 1,
    RequestCache = 2,
    RequestCredentials = 3,
    RequestMode = 4,
    RequestRedirect = 5,
    ResponseType = 6,
    ScrollBehavior = 7,
    ScrollLogicalPosition = 8,
    ScrollRestoration = 9,
}

const BINARY_TYPE: [&str; 2] = ["blob", "arraybuffer"];
const REFERRER_POLICY: [&str; 9] = [
    "",
    "no-referrer",
    "no-referrer-when-downgrade",
    "origin",
    "origin-when-cross-origin",
    "unsafe-url",
    "same-origin",
    "strict-origin",
    "strict-origin-when-cross-origin",
];
const REQUEST_CACHE: [&str; 6] = [
    "default",
    "no-store",
    "reload",
    "no-cache",
    "force-cache",
    "only-if-cached",
];
const REQUEST_CREDENTIALS: [&str; 3] = ["omit", "same-origin", "include"];
const REQUEST_MODE: [&str; 4] = ["same-origin", "no-cors", "cors", "navigate"];
const REQUEST_REDIRECT: [&str; 3] = ["follow", "error", "manual"];
const RESPONSE_TYPE: [&str; 6] = ["basic", "cors", "default", "error", "opaque", "opaqueredirect"];
const SCROLL_BEHAVIOR: [&str; 3] = ["auto", "instant", "smooth"];
const SCROLL_LOGICAL_POSITION: [&str; 4] = ["start", "center", "end", "nearest"];
const SCROLL_RESTORATION: [&str; 2] = ["auto", "manual"];

impl StringEnum {
    pub const ALL: [StringEnum; 10] = [
        Self::BinaryType,
        Self::ReferrerPolicy,
        Self::RequestCache,
        Self::RequestCredentials,
        Self::RequestMode,
        Self::RequestRedirect,
        Self::ResponseType,
        Self::ScrollBehavior,
        Self::ScrollLogicalPosition,
        Self::ScrollRestoration,
    ];

    /// Look up a table by the id the module passes.
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn variants(self) -> &'static [&'static str] {
        match self {
            Self::BinaryType => &BINARY_TYPE,
            Self::ReferrerPolicy => &REFERRER_POLICY,
            Self::RequestCache => &REQUEST_CACHE,
            Self::RequestCredentials => &REQUEST_CREDENTIALS,
            Self::RequestMode => &REQUEST_MODE,
            Self::RequestRedirect => &REQUEST_REDIRECT,
            Self::ResponseType => &RESPONSE_TYPE,
            Self::ScrollBehavior => &SCROLL_BEHAVIOR,
            Self::ScrollLogicalPosition => &SCROLL_LOGICAL_POSITION,
            Self::ScrollRestoration => &SCROLL_RESTORATION,
        }
    }

    pub fn text(self, index: u32) -> Option<&'static str> {
        self.variants().get(index as usize).copied()
    }

    pub fn index_of(self, text: &str) -> Option<u32> {
        self.variants()
            .iter()
            .position(|&v| v == text)
            .map(|i| i as u32)
    }
}
