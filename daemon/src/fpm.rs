//! Forwarding Plane Manager ingest: the routing stack streams netlink
//! messages to us over TCP, each wrapped in a 4-byte FPM header. This is
//! the producer side of the broker.

use std::io::{ErrorKind, Read};

use log::{debug, warn};
use route_broker::{RouteBroker, RoutePriority};

use crate::error::FpmError;
use crate::netlink::{
    NlRouteMessage, AF_INET, NLMSG_HDR_LEN, RTM_DELROUTE, RTM_NEWROUTE, RTMSG_LEN,
    RTPROT_KERNEL, RT_SCOPE_LINK, RT_SCOPE_UNIVERSE, RT_TABLE_MAIN, RT_TABLE_UNSPEC,
};

/// FPM protocol version we speak.
pub const FPM_VERSION: u8 = 1;
/// The only payload kind we accept: netlink.
pub const FPM_MSG_TYPE_NETLINK: u8 = 1;
/// Header: version u8, msg_type u8, msg_len u16 network order (total
/// length, header included).
pub const FPM_HDR_LEN: usize = 4;
pub const FPM_MAX_MSG_LEN: usize = 4096;

/// Default TCP port the routing stack connects to.
pub const FPM_DEFAULT_PORT: u16 = 2620;

/// Reads FPM-framed netlink buffers off a stream.
pub struct FpmReader<R: Read> {
    stream: R,
}

impl<R: Read> FpmReader<R> {
    pub fn new(stream: R) -> Self {
        Self { stream }
    }

    /// Next framed payload, or `None` on a clean end of stream.
    pub fn read_message(&mut self) -> Result<Option<Vec<u8>>, FpmError> {
        let mut header = [0u8; FPM_HDR_LEN];
        if !read_full(&mut self.stream, &mut header)? {
            return Ok(None);
        }

        let version = header[0];
        let msg_type = header[1];
        let msg_len = u16::from_be_bytes([header[2], header[3]]) as usize;

        if version != FPM_VERSION {
            return Err(FpmError::UnsupportedVersion(version));
        }
        if msg_type != FPM_MSG_TYPE_NETLINK {
            return Err(FpmError::UnexpectedType(msg_type));
        }
        if msg_len < FPM_HDR_LEN {
            return Err(FpmError::Runt(msg_len));
        }
        if msg_len > FPM_MAX_MSG_LEN {
            return Err(FpmError::Oversized(msg_len));
        }

        let mut payload = vec![0u8; msg_len - FPM_HDR_LEN];
        if !read_full(&mut self.stream, &mut payload)? {
            return Err(FpmError::Io(ErrorKind::UnexpectedEof.into()));
        }
        Ok(Some(payload))
    }
}

/// `read_exact`, except a clean EOF before the first byte reports `false`
/// instead of an error.
fn read_full<R: Read>(stream: &mut R, buf: &mut [u8]) -> Result<bool, FpmError> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(FpmError::Io(ErrorKind::UnexpectedEof.into())),
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(FpmError::Io(err)),
        }
    }
    Ok(true)
}

/// Walk the netlink messages embedded in one FPM payload and publish each
/// route into the broker.
pub fn publish_netlink_batch(broker: &RouteBroker<NlRouteMessage>, buf: &[u8]) {
    let mut off = 0;
    while off + NLMSG_HDR_LEN + RTMSG_LEN <= buf.len() {
        let msg = match NlRouteMessage::from_bytes(&buf[off..]) {
            Ok(msg) => msg,
            Err(err) => {
                warn!("undecodable netlink message in FPM payload: {err}");
                return;
            }
        };
        // netlink messages are 4-byte aligned within a batch
        off += (msg.len() + 3) & !3;

        match msg.msg_type() {
            RTM_NEWROUTE | RTM_DELROUTE => publish_route(broker, msg),
            other => debug!("skipping netlink message type {other}"),
        }
    }
}

fn publish_route(broker: &RouteBroker<NlRouteMessage>, mut msg: NlRouteMessage) {
    if msg.msg_type() == RTM_NEWROUTE {
        // Must be a replace or the dataplane won't update in place.
        msg.set_replace();
    }

    let priority = if msg.protocol() == RTPROT_KERNEL {
        // Connected IPv4 routes arrive from both the kernel (link scope)
        // and the FPM (universe scope), which would leave two entries in
        // the dataplane. Normalize them all to universe scope.
        if msg.family() == AF_INET && msg.scope() == RT_SCOPE_LINK {
            msg.set_scope(RT_SCOPE_UNIVERSE);
        }
        RoutePriority::Connected
    } else {
        RoutePriority::Other
    };

    if msg.table() == u32::from(RT_TABLE_UNSPEC) {
        msg.set_table(RT_TABLE_MAIN);
    }

    broker.publish(&msg, priority.level());
}
