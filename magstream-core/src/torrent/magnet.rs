//! Magnet link parsing
//!
//! Format: `magnet:?xt=urn:btih:<hash>&dn=<name>&tr=<tracker>`. The hash may
//! be 40 hex characters or 32 base32 characters.

use std::str::FromStr;

use super::{InfoHash, TorrentError};

/// Decoded magnet link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    /// Content identifier from the `xt` parameter
    pub info_hash: InfoHash,
    /// Human-readable label from the `dn` parameter
    pub display_name: Option<String>,
    /// Tracker URLs from `tr` parameters
    pub trackers: Vec<String>,
    /// The link as supplied by the client
    pub uri: String,
}

impl MagnetLink {
    /// Display name, falling back to the hex info hash.
    pub fn name(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| self.info_hash.to_string())
    }
}

impl FromStr for MagnetLink {
    type Err = TorrentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MagnetParser::parse_magnet_link(s)
    }
}

/// Magnet link parsing utilities.
pub struct MagnetParser;

impl MagnetParser {
    /// Parses magnet link to extract torrent information.
    ///
    /// Display name and trackers come from `magnet_url`; the info hash is
    /// decoded here since it may be hex or base32. When several `xt`
    /// parameters are present the first BitTorrent one wins.
    ///
    /// # Errors
    /// - `TorrentError::InvalidMagnetLink` - Wrong scheme or missing/invalid `xt=urn:btih:` hash
    pub fn parse_magnet_link(link: &str) -> Result<MagnetLink, TorrentError> {
        let trimmed = link.trim();
        let magnet =
            magnet_url::Magnet::new(trimmed).map_err(|e| TorrentError::InvalidMagnetLink {
                reason: e.to_string(),
            })?;

        let info_hash = Self::extract_info_hash(trimmed)?;

        Ok(MagnetLink {
            info_hash,
            display_name: magnet
                .display_name()
                .map(|name| decode_component(name))
                .filter(|name| !name.is_empty()),
            trackers: magnet
                .trackers()
                .iter()
                .map(|tracker| decode_component(tracker))
                .filter(|tracker| !tracker.is_empty())
                .collect(),
            uri: trimmed.to_string(),
        })
    }

    /// Info hash of the first `xt=urn:btih:` parameter.
    fn extract_info_hash(link: &str) -> Result<InfoHash, TorrentError> {
        let query = link
            .strip_prefix("magnet:?")
            .ok_or_else(|| TorrentError::InvalidMagnetLink {
                reason: "URI must start with 'magnet:?'".to_string(),
            })?;

        let hash_str = query
            .split('&')
            .find_map(|param| param.strip_prefix("xt=urn:btih:"))
            .ok_or_else(|| TorrentError::InvalidMagnetLink {
                reason: "Missing 'xt=urn:btih:' parameter".to_string(),
            })?;

        Self::parse_hash_from_string(hash_str)
    }

    /// Parse a hex or base32 string into a 20-byte hash
    fn parse_hash_from_string(hash_str: &str) -> Result<InfoHash, TorrentError> {
        match hash_str.len() {
            40 => InfoHash::from_hex(hash_str).map_err(|e| TorrentError::InvalidMagnetLink {
                reason: e.to_string(),
            }),
            32 => base32_decode(hash_str).map(InfoHash::new).ok_or_else(|| {
                TorrentError::InvalidMagnetLink {
                    reason: format!("Invalid base32 info hash: {hash_str}"),
                }
            }),
            len => Err(TorrentError::InvalidMagnetLink {
                reason: format!("Invalid hash length: {len} (expected 40 hex or 32 base32)"),
            }),
        }
    }
}

/// Percent-decodes a query value, treating `+` as a space.
fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Decode RFC 4648 base32 into a 20-byte hash
fn base32_decode(input: &str) -> Option<[u8; 20]> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

    let mut bits = 0u64;
    let mut bit_count = 0u32;
    let mut output = Vec::with_capacity(20);

    for c in input.bytes().map(|c| c.to_ascii_uppercase()) {
        let value = ALPHABET.iter().position(|&x| x == c)? as u64;
        bits = (bits << 5) | value;
        bit_count += 5;

        while bit_count >= 8 {
            bit_count -= 8;
            output.push((bits >> bit_count) as u8);
            bits &= (1 << bit_count) - 1;
        }
    }

    output.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c";

    #[test]
    fn test_parse_hex_magnet() {
        let link = format!("magnet:?xt=urn:btih:{HEX}&dn=Big+Buck+Bunny&tr=udp%3A%2F%2Fexplodie.org%3A6969");
        let magnet = MagnetParser::parse_magnet_link(&link).unwrap();

        assert_eq!(magnet.info_hash.to_string(), HEX);
        assert_eq!(magnet.display_name.as_deref(), Some("Big Buck Bunny"));
        assert_eq!(magnet.trackers, vec!["udp://explodie.org:6969".to_string()]);
    }

    #[test]
    fn test_parse_base32_matches_hex() {
        // Base32 encoding of the same 20 bytes
        let hex_link = format!("magnet:?xt=urn:btih:{HEX}");
        let base32_link = "magnet:?xt=urn:btih:3WBFL3G4PSSV7MF37AJSHWDQMLNR63I4";

        let from_hex = MagnetParser::parse_magnet_link(&hex_link).unwrap();
        let from_base32 = MagnetParser::parse_magnet_link(base32_link).unwrap();
        assert_eq!(from_hex.info_hash, from_base32.info_hash);
    }

    #[test]
    fn test_parse_keeps_every_tracker_in_order() {
        let link = format!(
            "  magnet:?dn=Sintel&tr=udp%3A%2F%2Fone.example%3A80&xt=urn:btih:{HEX}&tr=udp%3A%2F%2Ftwo.example%3A80\n"
        );
        let magnet = MagnetParser::parse_magnet_link(&link).unwrap();

        assert_eq!(magnet.info_hash.to_string(), HEX);
        assert_eq!(magnet.name(), "Sintel");
        assert_eq!(
            magnet.trackers,
            vec![
                "udp://one.example:80".to_string(),
                "udp://two.example:80".to_string()
            ]
        );
        assert!(magnet.uri.starts_with("magnet:?dn=Sintel"));
    }

    #[test]
    fn test_name_falls_back_to_hash() {
        let magnet: MagnetLink = format!("magnet:?xt=urn:btih:{HEX}").parse().unwrap();
        assert_eq!(magnet.name(), HEX);
    }

    #[test]
    fn test_invalid_magnet_links() {
        for link in [
            "",
            "http://example.com",
            "magnet:?dn=nohash",
            "magnet:?xt=urn:btih:1234",
            "magnet:?xt=urn:sha1:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c",
        ] {
            assert!(
                matches!(
                    MagnetParser::parse_magnet_link(link),
                    Err(TorrentError::InvalidMagnetLink { .. })
                ),
                "{link} should be rejected"
            );
        }
    }
}
