//! A bound listening port: its own difficulty, instance-id, extra-nonce
//! counter, and job-id sequence.

use rand::RngCore;
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::arithmetic::target_hex;
use crate::config::PortConfig;
use crate::error::PoolError;

pub struct Endpoint {
    pub difficulty: u64,
    pub target_hex: String,
    pub instance_id: [u8; 4],
    extra_nonce: AtomicU32,
    job_sequence: AtomicU64,
    admission: Arc<Semaphore>,
    addr: SocketAddr,
}

impl Endpoint {
    pub fn new(cfg: &PortConfig) -> Result<Self, PoolError> {
        let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
            .parse()
            .map_err(|e| PoolError::Config(format!("invalid listen address: {e}")))?;
        let mut instance_id = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut instance_id);
        Ok(Self {
            difficulty: cfg.difficulty,
            target_hex: target_hex(cfg.difficulty),
            instance_id,
            extra_nonce: AtomicU32::new(0),
            job_sequence: AtomicU64::new(0),
            admission: Arc::new(Semaphore::new(cfg.max_conn)),
            addr,
        })
    }

    pub fn next_extra_nonce(&self) -> u32 {
        self.extra_nonce.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_job_id(&self) -> String {
        self.job_sequence.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Binds the listener with `SO_KEEPALIVE` set before handing it to tokio.
    pub async fn bind(&self) -> Result<TcpListener, PoolError> {
        let domain = if self.addr.is_ipv6() {
            Domain::IPV6
        } else {
            Domain::IPV4
        };
        let socket = Socket::new(domain, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&self.addr.into())?;
        socket.listen(1024)?;
        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)?;
        tracing::info!(addr = %self.addr, "endpoint listening");
        Ok(listener)
    }

    pub fn configure_accepted(&self, stream: &TcpStream) -> Result<(), PoolError> {
        let socket_ref = socket2::SockRef::from(stream);
        socket_ref.set_keepalive(true)?;
        Ok(())
    }

    /// Acquires one admission permit for a new connection; the returned
    /// guard releases it when the session ends.
    pub async fn acquire_admission(&self) -> tokio::sync::OwnedSemaphorePermit {
        // The semaphore never closes, so acquiring never fails.
        self.admission
            .clone()
            .acquire_owned()
            .await
            .expect("endpoint admission semaphore closed unexpectedly")
    }
}
