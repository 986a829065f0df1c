//! Ethernet framing helpers
//!
//! Frames handled by the driver are plain in-memory byte buffers laid out as
//! a standard Ethernet II / 802.3 frame:
//!
//! ```text
//! +-------------+-------------+------------+------------------+
//! | Dest (6)    | Source (6)  | Type (2)   | Payload (46-1500)|
//! +-------------+-------------+------------+------------------+
//! ```
//!
//! Nothing above the link layer is interpreted.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Octets in one Ethernet address
pub const ETH_ALEN: usize = 6;
/// Total octets in the Ethernet header
pub const ETH_HLEN: usize = 14;
/// Minimum frame length, without FCS
pub const ETH_ZLEN: usize = 60;
/// Maximum payload length (default and maximum MTU)
pub const ETH_DATA_LEN: usize = 1500;
/// Maximum frame length, without FCS
pub const ETH_FRAME_LEN: usize = ETH_HLEN + ETH_DATA_LEN;
/// Smallest MTU an Ethernet device accepts
pub const ETH_MIN_MTU: usize = 68;
/// Headroom reserved in front of received frames so the network header
/// lands on a 16-byte boundary
pub const NET_IP_ALIGN: usize = 2;

/// Type field values at or above this are EtherTypes, below are 802.3 lengths
pub const ETH_P_802_3_MIN: u16 = 0x0600;
/// Raw 802.3 frame (Novell)
pub const ETH_P_802_3: u16 = 0x0001;
/// 802.2 LLC frame
pub const ETH_P_802_2: u16 = 0x0004;
/// IPv4
pub const ETH_P_IP: u16 = 0x0800;

/// A 48-bit link-layer address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct MacAddress(pub [u8; ETH_ALEN]);

impl MacAddress {
    /// The all-ones broadcast address
    pub const BROADCAST: Self = Self([0xff; ETH_ALEN]);

    /// Wrap raw octets
    #[must_use]
    pub const fn new(octets: [u8; ETH_ALEN]) -> Self {
        Self(octets)
    }

    /// Raw octets
    #[must_use]
    pub const fn octets(&self) -> [u8; ETH_ALEN] {
        self.0
    }

    /// Group (multicast or broadcast) bit set
    #[must_use]
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// All-ones address
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xff; ETH_ALEN]
    }

    /// Same address with `delta` added to the final octet.
    ///
    /// Returns `None` on overflow so distinct devices never wrap onto the same
    /// address.
    #[must_use]
    pub fn with_last_octet_offset(&self, delta: u8) -> Option<Self> {
        let mut octets = self.0;
        octets[ETH_ALEN - 1] = octets[ETH_ALEN - 1].checked_add(delta)?;
        Some(Self(octets))
    }

    /// Read an address from the first six bytes of `bytes`
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; ETH_ALEN] = bytes.get(..ETH_ALEN)?.try_into().ok()?;
        Some(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

/// Error returned when parsing a [`MacAddress`] from text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid MAC address: {0}")]
pub struct ParseMacError(String);

impl FromStr for MacAddress {
    type Err = ParseMacError;

    /// Accepts `aa:bb:cc:dd:ee:ff`, `aa-bb-cc-dd-ee-ff` or bare hex
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        let mut octets = [0u8; ETH_ALEN];
        hex::decode_to_slice(&digits, &mut octets).map_err(|_| ParseMacError(s.to_string()))?;
        Ok(Self(octets))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How a received frame relates to the receiving device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PacketType {
    /// Addressed to this device
    Host,
    /// Sent to the broadcast address
    Broadcast,
    /// Sent to a multicast group
    Multicast,
    /// Addressed to some other station
    OtherHost,
}

/// Result of classifying a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Protocol identifier handed to the stack
    pub protocol: u16,
    /// Addressing relative to the device
    pub pkt_type: PacketType,
}

/// Derive the protocol and packet type of `frame` as seen by a device whose
/// address is `dev_addr`.
///
/// Type fields of 0x0600 and above are EtherTypes. Smaller values are 802.3
/// lengths, in which case a leading `0xFFFF` payload word marks a raw 802.3
/// frame and anything else is 802.2 LLC. Frames shorter than the header are
/// classified as 802.2 to another host.
#[must_use]
pub fn classify(frame: &[u8], dev_addr: MacAddress) -> Classification {
    let Some(dest) = MacAddress::from_slice(frame) else {
        return Classification {
            protocol: ETH_P_802_2,
            pkt_type: PacketType::OtherHost,
        };
    };

    let pkt_type = if dest.is_multicast() {
        if dest.is_broadcast() {
            PacketType::Broadcast
        } else {
            PacketType::Multicast
        }
    } else if dest != dev_addr {
        PacketType::OtherHost
    } else {
        PacketType::Host
    };

    let protocol = match frame.get(12..ETH_HLEN) {
        Some(&[hi, lo]) => {
            let ty = u16::from_be_bytes([hi, lo]);
            if ty >= ETH_P_802_3_MIN {
                ty
            } else if frame.get(ETH_HLEN..ETH_HLEN + 2) == Some(&[0xff, 0xff][..]) {
                ETH_P_802_3
            } else {
                ETH_P_802_2
            }
        }
        _ => ETH_P_802_2,
    };

    Classification { protocol, pkt_type }
}

/// Write an Ethernet header into the first [`ETH_HLEN`] bytes of `buf`.
///
/// Returns `false` if `buf` is too short.
pub fn write_header(buf: &mut [u8], dest: MacAddress, source: MacAddress, ethertype: u16) -> bool {
    let Some(header) = buf.get_mut(..ETH_HLEN) else {
        return false;
    };
    header[..ETH_ALEN].copy_from_slice(&dest.0);
    header[ETH_ALEN..2 * ETH_ALEN].copy_from_slice(&source.0);
    header[2 * ETH_ALEN..].copy_from_slice(&ethertype.to_be_bytes());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEV: MacAddress = MacAddress([0x02, 0x53, 0x49, 0x4d, 0x4e, 0x30]);

    fn frame_to(dest: MacAddress, ty: u16, payload: &[u8]) -> Vec<u8> {
        let mut f = vec![0u8; ETH_HLEN];
        assert!(write_header(&mut f, dest, DEV, ty));
        f.extend_from_slice(payload);
        f
    }

    #[test]
    fn test_mac_display_and_parse() {
        assert_eq!(DEV.to_string(), "02:53:49:4d:4e:30");
        assert_eq!("02:53:49:4d:4e:30".parse::<MacAddress>().unwrap(), DEV);
        assert_eq!("02-53-49-4D-4E-30".parse::<MacAddress>().unwrap(), DEV);
        assert_eq!("0253494d4e30".parse::<MacAddress>().unwrap(), DEV);
        assert!("02:53:49".parse::<MacAddress>().is_err());
        assert!("zz:53:49:4d:4e:30".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_mac_serde_as_string() {
        let json = serde_json::to_string(&DEV).unwrap();
        assert_eq!(json, "\"02:53:49:4d:4e:30\"");
        let back: MacAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DEV);
    }

    #[test]
    fn test_last_octet_offset() {
        let next = DEV.with_last_octet_offset(1).unwrap();
        assert_eq!(next.0[..5], DEV.0[..5]);
        assert_eq!(next.0[5], 0x31);
        assert!(MacAddress([0, 0, 0, 0, 0, 0xff]).with_last_octet_offset(1).is_none());
    }

    #[test]
    fn test_classify_host_ethertype() {
        let f = frame_to(DEV, ETH_P_IP, &[0u8; 46]);
        let c = classify(&f, DEV);
        assert_eq!(c.protocol, ETH_P_IP);
        assert_eq!(c.pkt_type, PacketType::Host);
    }

    #[test]
    fn test_classify_broadcast_and_multicast() {
        let f = frame_to(MacAddress::BROADCAST, 0x0806, &[0u8; 46]);
        assert_eq!(classify(&f, DEV).pkt_type, PacketType::Broadcast);

        let group = MacAddress([0x01, 0x00, 0x5e, 0x00, 0x00, 0x01]);
        let f = frame_to(group, ETH_P_IP, &[0u8; 46]);
        assert_eq!(classify(&f, DEV).pkt_type, PacketType::Multicast);
    }

    #[test]
    fn test_classify_other_host() {
        let other = DEV.with_last_octet_offset(1).unwrap();
        let f = frame_to(other, ETH_P_IP, &[0u8; 46]);
        assert_eq!(classify(&f, DEV).pkt_type, PacketType::OtherHost);
    }

    #[test]
    fn test_classify_length_field() {
        let f = frame_to(DEV, 46, &[0xff, 0xff, 0, 0]);
        assert_eq!(classify(&f, DEV).protocol, ETH_P_802_3);

        let f = frame_to(DEV, 46, &[0xaa, 0xaa, 0x03, 0]);
        assert_eq!(classify(&f, DEV).protocol, ETH_P_802_2);
    }

    #[test]
    fn test_classify_truncated() {
        let c = classify(&[0x02, 0x53], DEV);
        assert_eq!(c.protocol, ETH_P_802_2);
        assert_eq!(c.pkt_type, PacketType::OtherHost);

        // Full addresses but no type field
        let c = classify(&DEV.0, DEV);
        assert_eq!(c.pkt_type, PacketType::Host);
        assert_eq!(c.protocol, ETH_P_802_2);
    }

    #[test]
    fn test_write_header_too_short() {
        let mut buf = [0u8; 10];
        assert!(!write_header(&mut buf, DEV, DEV, ETH_P_IP));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_classify_never_panics(frame in prop::collection::vec(any::<u8>(), 0..80), dev in any::<[u8; 6]>()) {
                let c = classify(&frame, MacAddress(dev));
                if frame.len() >= ETH_HLEN {
                    let ty = u16::from_be_bytes([frame[12], frame[13]]);
                    if ty >= ETH_P_802_3_MIN {
                        prop_assert_eq!(c.protocol, ty);
                    }
                }
            }

            #[test]
            fn prop_mac_display_parses_back(octets in any::<[u8; 6]>()) {
                let mac = MacAddress(octets);
                prop_assert_eq!(mac.to_string().parse::<MacAddress>().unwrap(), mac);
            }

            #[test]
            fn prop_header_then_classify(dest in any::<[u8; 6]>(), ty in ETH_P_802_3_MIN..=u16::MAX) {
                let mut frame = [0u8; 60];
                prop_assert!(write_header(&mut frame, MacAddress(dest), DEV, ty));
                let c = classify(&frame, DEV);
                prop_assert_eq!(c.protocol, ty);
                let expected = if MacAddress(dest).is_broadcast() {
                    PacketType::Broadcast
                } else if MacAddress(dest).is_multicast() {
                    PacketType::Multicast
                } else if MacAddress(dest) == DEV {
                    PacketType::Host
                } else {
                    PacketType::OtherHost
                };
                prop_assert_eq!(c.pkt_type, expected);
            }
        }
    }
}
