use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which half of the offer/answer exchange a description belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A session description as exchanged through the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Network candidate in the browser `RTCIceCandidateInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(
        candidate: impl Into<String>,
        sdp_mid: Option<&str>,
        sdp_mline_index: Option<u16>,
    ) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: sdp_mid.map(|s| s.to_string()),
            sdp_mline_index,
            username_fragment: None,
        }
    }

    /// An empty candidate line marks the end of gathering.
    pub fn is_end_of_candidates(&self) -> bool {
        self.candidate.trim().is_empty()
    }

    /// Reject lines that are not `candidate:` attributes.
    pub fn validate(&self) -> Result<()> {
        let line = self.candidate.trim();
        let line = line.strip_prefix("a=").unwrap_or(line);
        let fields = line
            .strip_prefix("candidate:")
            .map(|rest| rest.split_whitespace().count())
            .unwrap_or(0);

        // foundation component transport priority address port "typ" type
        if fields < 8 {
            return Err(Error::SignalingProtocol(format!(
                "malformed candidate '{}'",
                self.candidate
            )));
        }
        if self.sdp_mid.is_none() && self.sdp_mline_index.is_none() {
            return Err(Error::SignalingProtocol(
                "candidate has neither sdpMid nor sdpMLineIndex".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "candidate:842163049 1 udp 1677729535 192.168.1.10 54321 typ host";

    #[test]
    fn test_valid_candidate() {
        let candidate = IceCandidate::new(HOST, Some("0"), Some(0));
        assert!(candidate.validate().is_ok());
        assert!(!candidate.is_end_of_candidates());
    }

    #[test]
    fn test_malformed_candidates() {
        assert!(IceCandidate::new("garbage", Some("0"), Some(0)).validate().is_err());
        assert!(IceCandidate::new("candidate:1 1 udp", Some("0"), None).validate().is_err());
        assert!(IceCandidate::new(HOST, None, None).validate().is_err());
    }

    #[test]
    fn test_browser_json_shape() {
        let json = r#"{"candidate":"candidate:1 1 udp 1 10.0.0.1 9 typ host","sdpMid":"0","sdpMLineIndex":0}"#;
        let candidate: IceCandidate = serde_json::from_str(json).expect("Should decode candidate");
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_mline_index, Some(0));
        assert_eq!(candidate.username_fragment, None);
    }
}
