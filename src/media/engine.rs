//! Per-transport codec table
//!
//! Parsed from the remote offer so answers reuse the remote's dynamic
//! payload-type assignments. Outbound tracks resolve their payload type
//! against this table by codec name.

use super::TrackKind;
use crate::error::{Error, Result};
use webrtc::api::media_engine::MediaEngine;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};

/// One negotiated codec entry
#[derive(Debug, Clone)]
pub struct Codec {
    pub payload_type: u8,
    pub kind: TrackKind,
    pub capability: RTCRtpCodecCapability,
}

impl Codec {
    pub fn name(&self) -> &str {
        super::codec_name(&self.capability.mime_type)
    }
}

/// Codec table negotiated from a remote offer
#[derive(Debug, Clone, Default)]
pub struct CodecTable {
    codecs: Vec<Codec>,
}

impl CodecTable {
    /// Build the table from the remote offer's rtpmap/fmtp lines
    ///
    /// Fails with [`Error::SdpParseFailed`] when the SDP cannot be parsed or
    /// carries no usable media codecs.
    pub fn from_offer(offer: &RTCSessionDescription) -> Result<Self> {
        let parsed = offer.unmarshal().map_err(|_| Error::SdpParseFailed)?;

        let mut codecs = Vec::new();
        for md in &parsed.media_descriptions {
            let kind = match md.media_name.media.as_str() {
                "audio" => TrackKind::Audio,
                "video" => TrackKind::Video,
                _ => continue,
            };

            for attr in &md.attributes {
                if attr.key != "rtpmap" {
                    continue;
                }
                let Some(value) = attr.value.as_deref() else {
                    continue;
                };
                let Some((pt, map)) = value.split_once(' ') else {
                    continue;
                };
                let Ok(payload_type) = pt.parse::<u8>() else {
                    continue;
                };

                let mut parts = map.split('/');
                let Some(name) = parts.next() else { continue };
                let clock_rate = parts.next().and_then(|c| c.parse::<u32>().ok()).unwrap_or(0);
                let channels = parts.next().and_then(|c| c.parse::<u16>().ok()).unwrap_or(0);

                let sdp_fmtp_line = md
                    .attributes
                    .iter()
                    .filter(|a| a.key == "fmtp")
                    .filter_map(|a| a.value.as_deref())
                    .find_map(|v| {
                        v.split_once(' ')
                            .filter(|(fmtp_pt, _)| *fmtp_pt == pt)
                            .map(|(_, line)| line.to_string())
                    })
                    .unwrap_or_default();

                codecs.push(Codec {
                    payload_type,
                    kind,
                    capability: RTCRtpCodecCapability {
                        mime_type: format!("{kind}/{name}"),
                        clock_rate,
                        channels,
                        sdp_fmtp_line,
                        rtcp_feedback: vec![],
                    },
                });
            }
        }

        if codecs.is_empty() {
            return Err(Error::SdpParseFailed);
        }

        Ok(Self { codecs })
    }

    /// All codecs matching `name`, in offer order
    pub fn codecs_by_name(&self, name: &str) -> Vec<&Codec> {
        self.codecs
            .iter()
            .filter(|c| c.name().eq_ignore_ascii_case(name))
            .collect()
    }

    pub fn codecs(&self) -> &[Codec] {
        &self.codecs
    }

    /// Build a `webrtc` media engine registering exactly this codec set
    pub fn media_engine(&self) -> Result<MediaEngine> {
        let mut me = MediaEngine::default();
        for codec in &self.codecs {
            let typ = match codec.kind {
                TrackKind::Audio => RTPCodecType::Audio,
                TrackKind::Video => RTPCodecType::Video,
            };
            me.register_codec(
                RTCRtpCodecParameters {
                    capability: codec.capability.clone(),
                    payload_type: codec.payload_type,
                    ..Default::default()
                },
                typ,
            )?;
        }
        Ok(me)
    }
}
