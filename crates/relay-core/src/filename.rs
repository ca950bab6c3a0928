//! # Filename Rules
//!
//! Every image in the watched folder is named after the product it belongs to.
//!
//! ## Naming Convention
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  PRODUCTCODE_TYPE_VERSION[_...].ext                     │
//! │                                                                         │
//! │   ABC123_FRONT_01.jpg                                                   │
//! │   ──┬───  ──┬──  ┬                                                      │
//! │     │       │    └── version       "01"                                 │
//! │     │       └─────── asset type    "FRONT"                              │
//! │     └─────────────── product code  "ABC123" (association key)           │
//! │                                                                         │
//! │   Extra `_` segments are allowed and ignored.                           │
//! │   Fewer than three segments is a ValidationError, not a skip.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Extensions accepted when nothing else is configured.
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 5] = ["tif", "tiff", "jpg", "jpeg", "png"];

// =============================================================================
// Asset Name
// =============================================================================

/// The decomposed parts of a conforming filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetName {
    pub product_code: String,
    pub asset_type: String,
    pub version: String,
}

impl AssetName {
    /// Splits the filename stem on `_` and takes the first three parts.
    ///
    /// ## Example
    /// ```rust
    /// use relay_core::filename::AssetName;
    ///
    /// let parsed = AssetName::parse("ABC123_FRONT_01.jpg").unwrap();
    /// assert_eq!(parsed.asset_type, "FRONT");
    /// assert!(AssetName::parse("bad.jpg").is_err());
    /// ```
    pub fn parse(filename: &str) -> Result<Self, ValidationError> {
        let stem = Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        let parts: Vec<&str> = stem.split('_').collect();
        if parts.len() < 3 {
            return Err(ValidationError::MalformedFilename {
                name: filename.to_string(),
                parts: if stem.is_empty() { 0 } else { parts.len() },
            });
        }

        Ok(AssetName {
            product_code: parts[0].to_string(),
            asset_type: parts[1].to_string(),
            version: parts[2].to_string(),
        })
    }
}

// =============================================================================
// Extension Policy
// =============================================================================

/// Case-insensitive allow-list of file extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionPolicy {
    allowed: BTreeSet<String>,
}

impl ExtensionPolicy {
    /// Builds a policy from extensions written with or without a leading dot.
    pub fn new<I, S>(extensions: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed: BTreeSet<String> = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        if allowed.is_empty() {
            return Err(ValidationError::EmptyAllowList);
        }

        Ok(ExtensionPolicy { allowed })
    }

    /// Returns true if the filename's extension is in the allow-list.
    pub fn allows(&self, filename: &str) -> bool {
        extension_of(filename).is_some_and(|ext| self.allowed.contains(&ext))
    }

    /// The normalized extensions (lowercase, no dot).
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }
}

impl Default for ExtensionPolicy {
    fn default() -> Self {
        ExtensionPolicy {
            allowed: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

// =============================================================================
// Content Type
// =============================================================================

/// MIME type sent with the upload, derived from the extension.
pub fn content_type_for(filename: &str) -> &'static str {
    match extension_of(filename).as_deref() {
        Some("tif") | Some("tiff") => "image/tiff",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}
