//! Hands a finished flow or stats datagram to every configured
//! UDP destination and/or the capture-file writer. A send failure to one
//! destination is logged and does not stop delivery to the others.

use core::net::{Ipv4Addr, SocketAddrV4};
use std::net::UdpSocket;

use capture::pcapfile;

use crate::config::FLOW_DEST_PORT;

pub struct Emitter {
	socket: Option<UdpSocket>,
	udp_dests: Vec<Ipv4Addr>,
	file: Option<pcapfile::Writer>,
}

impl Emitter {
	pub fn new(udp_dests: Vec<Ipv4Addr>, file: Option<pcapfile::Writer>) -> Self {
		Emitter { socket: None, udp_dests, file }
	}

	fn socket(&mut self) -> Option<&UdpSocket> {
		if self.socket.is_none() {
			match UdpSocket::bind("0.0.0.0:0") {
				Ok(s) => self.socket = Some(s),
				Err(e) => {
					log::error!("unable to create emitter UDP socket: {e}");
					return None;
				}
			}
		}

		self.socket.as_ref()
	}

	/// Send `datagram` to every configured UDP destination and the capture
	/// file, if any. Failures are logged per-destination; none of them abort
	/// delivery to the rest.
	pub fn emit(&mut self, datagram: &[u8]) {
		if !self.udp_dests.is_empty() {
			let dests: Vec<Ipv4Addr> = self.udp_dests.clone();

			if let Some(socket) = self.socket() {
				for dest in &dests {
					let addr = SocketAddrV4::new(*dest, FLOW_DEST_PORT);
					if let Err(e) = socket.send_to(datagram, addr) {
						log::warn!("send to {addr} failed: {e}");
					}
				}
			}
		}

		if let Some(file) = &mut self.file {
			if file.write(datagram).is_err() {
				log::error!("write to capture-file output failed");
			}
		}
	}
}
