//! A raw `AF_PACKET`/`SOCK_RAW` socket, bound to an interface and a single ethertype, joined
//! to a multicast group in promiscuous mode.
//!
//! The ioctl and setsockopt numbers below (`SIOCGIFINDEX`, `SOL_PACKET`,
//! `PACKET_ADD_MEMBERSHIP`) and the `packet_mreq` layout are the real Linux kernel values —
//! they must match exactly, there is no portable abstraction for them.

use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, RawFd};

use dot8021x_types::{Error, MacAddress, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::unix::AsyncFd;

const SIOCGIFINDEX: libc::c_ulong = 0x8933;
const PACKET_MR_PROMISC: u16 = 1;
const SOL_PACKET: libc::c_int = 263;
const PACKET_ADD_MEMBERSHIP: libc::c_int = 1;

/// `struct sockaddr_ll` (Linux `<linux/if_packet.h>`), laid out exactly as the kernel expects.
#[repr(C)]
struct SockaddrLl {
    sll_family: u16,
    sll_protocol: u16,
    sll_ifindex: i32,
    sll_hatype: u16,
    sll_pkttype: u8,
    sll_halen: u8,
    sll_addr: [u8; 8],
}

/// `struct packet_mreq` (Linux `<linux/if_packet.h>`).
#[repr(C)]
struct PacketMreq {
    mr_ifindex: i32,
    mr_type: u16,
    mr_alen: u16,
    mr_address: [u8; 8],
}

/// `struct ifreq`'s name+ifindex prefix, as used by `SIOCGIFINDEX`.
#[repr(C)]
struct IfreqIndex {
    ifr_name: [u8; 16],
    ifr_ifindex: i32,
}

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// A bound, non-blocking raw L2 socket receiving frames of a single ethertype.
pub struct RawL2Socket {
    async_fd: AsyncFd<Socket>,
}

impl RawL2Socket {
    /// Opens and configures a raw socket on `interface`, filtering for `ethertype`, and joins
    /// promiscuous multicast membership for `group_address`. Entirely blocking setup, meant to
    /// run once before any I/O task starts (§5).
    ///
    /// # Errors
    /// Returns [`Error::SocketError`] if the socket, bind, ioctl, or setsockopt calls fail.
    pub fn open(interface: &str, ethertype: u16, group_address: MacAddress) -> Result<Self> {
        // AF_PACKET isn't one of socket2's named domains/protocols; build it through the raw
        // constructor but keep using socket2::Socket for everything downstream (nonblocking,
        // safe close-on-drop, AsRawFd).
        let domain = Domain::from(libc::AF_PACKET);
        let ty = Type::from(libc::SOCK_RAW);
        let protocol = Protocol::from(i32::from(ethertype.to_be()));

        let socket = Socket::new(domain, ty, Some(protocol))
            .map_err(|e| Error::socket(format!("socket(AF_PACKET, SOCK_RAW) failed: {e}")))?;

        let fd = socket.as_raw_fd();
        Self::configure(fd, interface, ethertype, group_address)?;

        socket
            .set_nonblocking(true)
            .map_err(|e| Error::socket(format!("set O_NONBLOCK failed: {e}")))?;

        let async_fd = AsyncFd::new(socket)
            .map_err(|e| Error::socket(format!("registering fd with runtime failed: {e}")))?;

        Ok(Self { async_fd })
    }

    fn configure(
        fd: RawFd,
        interface: &str,
        ethertype: u16,
        group_address: MacAddress,
    ) -> Result<()> {
        let ifindex = interface_index(fd, interface)?;
        bind_interface(fd, ifindex, ethertype)?;
        join_promiscuous(fd, ifindex, group_address)?;
        Ok(())
    }

    /// Sends one frame. The caller is responsible for having already built a full Ethernet
    /// frame (header + payload).
    ///
    /// # Errors
    /// Returns [`Error::SocketError`] on a write failure other than would-block.
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        loop {
            let mut guard = self
                .async_fd
                .writable()
                .await
                .map_err(|e| Error::socket(format!("socket unavailable for write: {e}")))?;

            match guard.try_io(|inner| inner.get_ref().send(data)) {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(e)) => return Err(Error::socket(format!("write failed: {e}"))),
                Err(_would_block) => continue,
            }
        }
    }

    /// Receives one frame into `buf`, returning the number of bytes written.
    ///
    /// # Errors
    /// Returns [`Error::SocketError`] on a read failure other than would-block, or if the
    /// socket has been closed.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let mut guard = self
                .async_fd
                .readable()
                .await
                .map_err(|e| Error::socket(format!("socket unavailable for read: {e}")))?;

            let raw_fd = self.async_fd.get_ref().as_raw_fd();
            match guard.try_io(|_| {
                let ret = unsafe { libc::read(raw_fd, buf.as_mut_ptr().cast(), buf.len()) };
                if ret < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(ret as usize)
                }
            }) {
                Ok(Ok(n)) => return Ok(n),
                Ok(Err(e)) => return Err(Error::socket(format!("read failed: {e}"))),
                Err(_would_block) => continue,
            }
        }
    }

    /// Shuts down both directions and releases the descriptor. Post-close reads/writes fail
    /// cleanly rather than blocking forever.
    pub fn close(self) {
        let _ = self.async_fd.get_ref().shutdown(std::net::Shutdown::Both);
        // AsyncFd's drop closes the underlying fd.
        drop(self.async_fd);
    }
}

fn interface_index(fd: RawFd, interface: &str) -> Result<i32> {
    let mut name = [0u8; 16];
    let bytes = interface.as_bytes();
    if bytes.len() >= name.len() {
        return Err(Error::socket(format!(
            "interface name too long: {interface}"
        )));
    }
    name[..bytes.len()].copy_from_slice(bytes);

    let mut req = MaybeUninit::<IfreqIndex>::zeroed();
    unsafe {
        (*req.as_mut_ptr()).ifr_name = name;
    }

    cvt(unsafe { libc::ioctl(fd, SIOCGIFINDEX, req.as_mut_ptr()) })
        .map_err(|e| Error::socket(format!("SIOCGIFINDEX failed for {interface}: {e}")))?;

    Ok(unsafe { req.assume_init() }.ifr_ifindex)
}

fn bind_interface(fd: RawFd, ifindex: i32, ethertype: u16) -> Result<()> {
    let addr = SockaddrLl {
        sll_family: libc::AF_PACKET as u16,
        sll_protocol: ethertype.to_be(),
        sll_ifindex: ifindex,
        sll_hatype: 0,
        sll_pkttype: 0,
        sll_halen: 0,
        sll_addr: [0; 8],
    };
    cvt(unsafe {
        libc::bind(
            fd,
            std::ptr::addr_of!(addr).cast(),
            std::mem::size_of::<SockaddrLl>() as u32,
        )
    })
    .map_err(|e| Error::socket(format!("bind failed: {e}")))?;
    Ok(())
}

fn join_promiscuous(fd: RawFd, ifindex: i32, group_address: MacAddress) -> Result<()> {
    let octets = group_address.octets();
    let mut address = [0u8; 8];
    address[..6].copy_from_slice(&octets);

    let mreq = PacketMreq {
        mr_ifindex: ifindex,
        mr_type: PACKET_MR_PROMISC,
        mr_alen: 6,
        mr_address: address,
    };
    cvt(unsafe {
        libc::setsockopt(
            fd,
            SOL_PACKET,
            PACKET_ADD_MEMBERSHIP,
            std::ptr::addr_of!(mreq).cast(),
            std::mem::size_of::<PacketMreq>() as u32,
        )
    })
    .map_err(|e| Error::socket(format!("PACKET_ADD_MEMBERSHIP failed: {e}")))?;
    Ok(())
}

impl AsRawFd for RawL2Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.async_fd.get_ref().as_raw_fd()
    }
}
