//! Just enough rtnetlink to broker routes: a raw-bytes message wrapper with
//! the header/rtmsg/attribute accessors the topic generator and the FPM
//! normalizations need. The payload handed to consumers is always the raw
//! netlink message, so the dataplane sees exactly what the kernel or the
//! routing stack emitted.

use std::net::{Ipv4Addr, Ipv6Addr};

use route_broker::{BrokerObject, CopyError, TopicVerdict};

use crate::error::NetlinkError;

pub const RTM_NEWROUTE: u16 = 24;
pub const RTM_DELROUTE: u16 = 25;

pub const NLM_F_REPLACE: u16 = 0x100;

pub const AF_INET: u8 = 2;
pub const AF_INET6: u8 = 10;
/// rtnetlink multicast-routing family codes (RTNL_FAMILY_IPMR/IP6MR).
pub const RTNL_FAMILY_IPMR: u8 = 128;
pub const RTNL_FAMILY_IP6MR: u8 = 129;

pub const RTN_BROADCAST: u8 = 3;
pub const RTN_MULTICAST: u8 = 5;

pub const RT_TABLE_UNSPEC: u8 = 0;
pub const RT_TABLE_MAIN: u8 = 254;
pub const RT_TABLE_LOCAL: u8 = 255;

pub const RT_SCOPE_UNIVERSE: u8 = 0;
pub const RT_SCOPE_LINK: u8 = 253;

pub const RTPROT_KERNEL: u8 = 2;

pub const RTM_F_CLONED: u32 = 0x200;

pub const RTA_DST: u16 = 1;
pub const RTA_SRC: u16 = 2;
pub const RTA_IIF: u16 = 3;
pub const RTA_OIF: u16 = 4;
pub const RTA_TABLE: u16 = 15;

/// nlmsghdr: len u32, type u16, flags u16, seq u32, pid u32.
pub const NLMSG_HDR_LEN: usize = 16;
/// rtmsg: family, dst_len, src_len, tos, table, protocol, scope, type, flags u32.
pub const RTMSG_LEN: usize = 12;

const RTMSG_TABLE_OFF: usize = NLMSG_HDR_LEN + 4;
const RTMSG_PROTOCOL_OFF: usize = NLMSG_HDR_LEN + 5;
const RTMSG_SCOPE_OFF: usize = NLMSG_HDR_LEN + 6;
const RTMSG_TYPE_OFF: usize = NLMSG_HDR_LEN + 7;
const RTMSG_FLAGS_OFF: usize = NLMSG_HDR_LEN + 8;

/// One netlink route message, owned. Multi-byte header fields are in host
/// byte order, as on a netlink socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NlRouteMessage {
    bytes: Vec<u8>,
}

impl NlRouteMessage {
    /// Take one message off the front of a buffer. The buffer may extend
    /// past the message (netlink batches); only the declared length is
    /// consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NetlinkError> {
        if bytes.len() < NLMSG_HDR_LEN + RTMSG_LEN {
            return Err(NetlinkError::TooShort { len: bytes.len() });
        }
        let declared = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if declared < NLMSG_HDR_LEN + RTMSG_LEN || declared > bytes.len() {
            return Err(NetlinkError::BadLength {
                declared,
                available: bytes.len(),
            });
        }
        Ok(Self {
            bytes: bytes[..declared].to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    fn u16_at(&self, off: usize) -> u16 {
        u16::from_ne_bytes([self.bytes[off], self.bytes[off + 1]])
    }

    fn u32_at(&self, off: usize) -> u32 {
        u32::from_ne_bytes([
            self.bytes[off],
            self.bytes[off + 1],
            self.bytes[off + 2],
            self.bytes[off + 3],
        ])
    }

    pub fn msg_type(&self) -> u16 {
        self.u16_at(4)
    }

    pub fn nlmsg_flags(&self) -> u16 {
        self.u16_at(6)
    }

    pub fn family(&self) -> u8 {
        self.bytes[NLMSG_HDR_LEN]
    }

    pub fn dst_len(&self) -> u8 {
        self.bytes[NLMSG_HDR_LEN + 1]
    }

    pub fn src_len(&self) -> u8 {
        self.bytes[NLMSG_HDR_LEN + 2]
    }

    pub fn table(&self) -> u32 {
        match self.attr(RTA_TABLE) {
            Some(payload) if payload.len() == 4 => {
                u32::from_ne_bytes([payload[0], payload[1], payload[2], payload[3]])
            }
            _ => u32::from(self.bytes[RTMSG_TABLE_OFF]),
        }
    }

    pub fn protocol(&self) -> u8 {
        self.bytes[RTMSG_PROTOCOL_OFF]
    }

    pub fn scope(&self) -> u8 {
        self.bytes[RTMSG_SCOPE_OFF]
    }

    pub fn route_type(&self) -> u8 {
        self.bytes[RTMSG_TYPE_OFF]
    }

    pub fn route_flags(&self) -> u32 {
        self.u32_at(RTMSG_FLAGS_OFF)
    }

    /// Dataplanes treat a plain NEWROUTE as create-only; flag it as a
    /// replace so re-announcements update in place.
    pub fn set_replace(&mut self) {
        let flags = self.nlmsg_flags() | NLM_F_REPLACE;
        self.bytes[6..8].copy_from_slice(&flags.to_ne_bytes());
    }

    pub fn set_scope(&mut self, scope: u8) {
        self.bytes[RTMSG_SCOPE_OFF] = scope;
    }

    pub fn set_table(&mut self, table: u8) {
        self.bytes[RTMSG_TABLE_OFF] = table;
    }

    /// Payload of the first attribute of the given type, if present and
    /// well-formed.
    pub fn attr(&self, want: u16) -> Option<&[u8]> {
        let mut off = NLMSG_HDR_LEN + RTMSG_LEN;
        while off + 4 <= self.bytes.len() {
            let len = self.u16_at(off) as usize;
            if len < 4 || off + len > self.bytes.len() {
                return None;
            }
            if self.u16_at(off + 2) == want {
                return Some(&self.bytes[off + 4..off + len]);
            }
            off += (len + 3) & !3;
        }
        None
    }

    fn attr_u32(&self, want: u16) -> Option<u32> {
        match self.attr(want) {
            Some(payload) if payload.len() == 4 => Some(u32::from_ne_bytes([
                payload[0], payload[1], payload[2], payload[3],
            ])),
            _ => None,
        }
    }

    /// Render an address attribute for the topic string. A missing
    /// attribute is the all-zeros address; a malformed one is None.
    fn topic_addr(&self, attr: u16) -> Option<String> {
        let family = match self.family() {
            AF_INET | RTNL_FAMILY_IPMR => AF_INET,
            AF_INET6 | RTNL_FAMILY_IP6MR => AF_INET6,
            _ => return None,
        };
        match (family, self.attr(attr)) {
            (AF_INET, None) => Some(Ipv4Addr::UNSPECIFIED.to_string()),
            (AF_INET, Some(p)) if p.len() == 4 => {
                Some(Ipv4Addr::new(p[0], p[1], p[2], p[3]).to_string())
            }
            (AF_INET6, None) => Some(Ipv6Addr::UNSPECIFIED.to_string()),
            (AF_INET6, Some(p)) if p.len() == 16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(p);
                Some(Ipv6Addr::from(octets).to_string())
            }
            _ => None,
        }
    }

    /// Multicast routes key on (iif, oif, group, origin, table); routes in
    /// the local table are not distributed.
    fn multicast_topic(&self) -> Option<String> {
        if self.bytes[RTMSG_TABLE_OFF] == RT_TABLE_LOCAL {
            return None;
        }
        let group = self.topic_addr(RTA_DST)?;
        let origin = self.topic_addr(RTA_SRC)?;
        let iif = self.attr_u32(RTA_IIF).unwrap_or(0);
        let oif = self.attr_u32(RTA_OIF).unwrap_or(0);
        Some(format!(
            "route {iif} {oif} {group}/{} {origin}/{} {}",
            self.dst_len(),
            self.src_len(),
            self.table()
        ))
    }

    /// Unicast routes key on (destination, scope, table).
    fn unicast_topic(&self) -> Option<String> {
        let dest = self.topic_addr(RTA_DST)?;
        Some(format!(
            "r {dest}/{} {} {}",
            self.dst_len(),
            self.scope(),
            self.table()
        ))
    }
}

impl BrokerObject for NlRouteMessage {
    fn topic(&self) -> TopicVerdict {
        let delete = match self.msg_type() {
            RTM_NEWROUTE => false,
            RTM_DELROUTE => true,
            _ => return TopicVerdict::Ignore,
        };

        if self.route_type() == RTN_MULTICAST {
            return match self.multicast_topic() {
                Some(key) => TopicVerdict::Publish { key, delete },
                None => TopicVerdict::Ignore,
            };
        }

        if self.route_type() == RTN_BROADCAST {
            return TopicVerdict::Ignore;
        }

        // cached host routes are kernel-local
        if self.route_flags() & RTM_F_CLONED != 0 {
            return TopicVerdict::Ignore;
        }

        match self.unicast_topic() {
            Some(key) => TopicVerdict::Publish { key, delete },
            None => TopicVerdict::Ignore,
        }
    }

    fn try_copy(&self) -> Result<Self, CopyError> {
        Ok(self.clone())
    }
}
