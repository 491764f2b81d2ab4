//! One miner connection: framing, method dispatch, and the per-session job ring.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::time::{sleep_until, Instant};

use crate::blockchain::{BlockTemplate, TemplateRefresher, UpstreamPool};
use crate::config::Config;
use crate::error::{PoolError, StratumError};
use crate::miners::Miner;
use crate::shares::ShareValidator;
use crate::state::PoolState;
use crate::stratum::broadcaster::JobBroadcaster;
use crate::stratum::endpoint::Endpoint;
use crate::stratum::job::Job;
use crate::stratum::protocol::{
    GetJobParams, JobReplyData, LoginParams, LoginResult, Request, Response, StatusResult,
    SubmitParams,
};
use crate::time::now_ms;

const MAX_LINE_BYTES: usize = 10_240;
const JOB_RING_SIZE: usize = 4;

/// A live miner connection. Outlives individual method calls; pruned from
/// the registry on socket error or a failed job push.
pub struct Session {
    pub id: u64,
    pub ip: String,
    endpoint: Arc<Endpoint>,
    writer: AsyncMutex<OwnedWriteHalf>,
    valid_jobs: Mutex<VecDeque<Arc<Job>>>,
    last_block_height: AtomicI64,
    last_activity_ms: AtomicI64,
    /// Signaled every time `last_activity_ms` moves, so the idle-timeout wait
    /// in `serve()` can rearm its deadline even while blocked on a read that a
    /// different task (the broadcaster) can't otherwise interrupt.
    idle_notify: Notify,
    miner: Mutex<Option<Arc<Miner>>>,
}

impl Session {
    fn new(id: u64, ip: String, endpoint: Arc<Endpoint>, writer: OwnedWriteHalf) -> Self {
        Self {
            id,
            ip,
            endpoint,
            writer: AsyncMutex::new(writer),
            valid_jobs: Mutex::new(VecDeque::with_capacity(JOB_RING_SIZE)),
            last_block_height: AtomicI64::new(-1),
            last_activity_ms: AtomicI64::new(now_ms()),
            idle_notify: Notify::new(),
            miner: Mutex::new(None),
        }
    }

    fn touch(&self) {
        self.last_activity_ms.store(now_ms(), Ordering::Relaxed);
        self.idle_notify.notify_one();
    }

    async fn write_line(&self, value: &impl Serialize) -> Result<(), PoolError> {
        let mut line = serde_json::to_vec(value).map_err(|e| PoolError::Config(e.to_string()))?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Atomically swaps `last_block_height` with `template.height`; returns
    /// an empty reply if the session already has this height's job.
    fn get_job(&self, template: &BlockTemplate) -> Result<JobReplyData, PoolError> {
        let previous = self.last_block_height.swap(template.height, Ordering::AcqRel);
        if previous == template.height {
            return Ok(JobReplyData::default());
        }

        let extra_nonce = self.endpoint.next_extra_nonce();
        let blob = template.next_blob(extra_nonce, &self.endpoint.instance_id)?;
        let job_id = self.endpoint.next_job_id();
        let job = Arc::new(Job::new(job_id.clone(), extra_nonce, template.height));

        let mut jobs = self.valid_jobs.lock().unwrap();
        jobs.push_back(job);
        while jobs.len() > JOB_RING_SIZE {
            jobs.pop_front();
        }

        Ok(JobReplyData {
            job_id: Some(job_id),
            blob: Some(blob),
            target: Some(self.endpoint.target_hex.clone()),
            height: Some(template.height),
        })
    }

    fn find_job(&self, job_id: &str) -> Option<Arc<Job>> {
        self.valid_jobs
            .lock()
            .unwrap()
            .iter()
            .find(|job| job.id == job_id)
            .cloned()
    }

    fn set_miner(&self, miner: Arc<Miner>) {
        *self.miner.lock().unwrap() = Some(miner);
    }

    fn miner(&self) -> Option<Arc<Miner>> {
        self.miner.lock().unwrap().clone()
    }

    /// Pushes a `"job"` notification for the current template; called by the
    /// broadcaster on every template change. Returns `false` if the write
    /// failed, signalling the caller to drop this session.
    pub async fn push_job(&self, template: &BlockTemplate) -> bool {
        let data = match self.get_job(template) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(session = self.id, error = %e, "failed to mint job for push");
                return false;
            }
        };
        if data.job_id.is_none() {
            return true;
        }
        let push = crate::stratum::protocol::JobPush::new(data);
        match self.write_line(&push).await {
            Ok(()) => {
                self.touch();
                true
            }
            Err(e) => {
                tracing::debug!(session = self.id, error = %e, "job push failed");
                false
            }
        }
    }
}

/// Live sessions for one endpoint, keyed by session id. Iterated by the
/// broadcaster on every new template.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<u64, Arc<Session>>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn insert(&self, session: Arc<Session>) {
        self.sessions.lock().unwrap().insert(session.id, session);
    }

    pub fn remove(&self, id: u64) {
        self.sessions.lock().unwrap().remove(&id);
    }

    pub fn iter_buffered(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().unwrap().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a connection handler needs, bundled so `run` doesn't take a
/// dozen separate parameters.
pub struct SessionContext {
    pub endpoint: Arc<Endpoint>,
    pub sessions: Arc<SessionRegistry>,
    pub state: Arc<PoolState>,
    pub upstream_pool: Arc<UpstreamPool>,
    pub refresher: Arc<TemplateRefresher>,
    pub broadcaster: Arc<JobBroadcaster>,
    pub config: Arc<Config>,
}

pub async fn run(stream: TcpStream, ip: String, ctx: Arc<SessionContext>) {
    if let Err(e) = ctx.endpoint.configure_accepted(&stream) {
        tracing::warn!(error = %e, "failed to configure accepted socket");
    }
    let (read_half, write_half) = stream.into_split();
    let id = ctx.sessions.next_id.fetch_add(1, Ordering::Relaxed);
    let session = Arc::new(Session::new(id, ip, ctx.endpoint.clone(), write_half));
    ctx.sessions.insert(session.clone());

    if let Err(e) = serve(read_half, &session, &ctx).await {
        tracing::debug!(session = id, error = %e, "session ended");
    }
    ctx.sessions.remove(id);
}

async fn serve(
    read_half: tokio::net::tcp::OwnedReadHalf,
    session: &Arc<Session>,
    ctx: &Arc<SessionContext>,
) -> Result<(), PoolError> {
    let timeout = crate::config::parse_duration(&ctx.config.stratum.timeout)?;
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        let read_line = reader.read_line(&mut line);
        tokio::pin!(read_line);

        let bytes_read = loop {
            let remaining = until(session.last_activity_ms.load(Ordering::Relaxed), timeout);
            if remaining.is_zero() {
                return Err(PoolError::Config("session idle timeout".to_string()));
            }
            let deadline = Instant::now() + remaining;
            tokio::select! {
                result = &mut read_line => break result?,
                // Either the deadline genuinely elapsed (checked on the next
                // iteration) or a job push/received line just extended it.
                _ = sleep_until(deadline) => {}
                _ = session.idle_notify.notified() => {}
            }
        };
        if bytes_read == 0 {
            return Ok(());
        }
        if line.len() > MAX_LINE_BYTES {
            tracing::warn!(session = session.id, "line exceeds buffer capacity, closing");
            return Ok(());
        }
        let trimmed = line.trim();
        if trimmed.len() <= 1 {
            continue;
        }

        session.touch();
        let request: Request = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(_) => continue,
        };

        if request.id.is_null() || (request.params.is_null() && request.method != "keepalived") {
            return Ok(());
        }

        match dispatch(session, ctx, &request).await {
            Ok(result) => {
                session.write_line(&Response::ok(request.id, result)).await?;
            }
            Err(error) => {
                session.write_line(&Response::err(request.id, &error)).await?;
                if error.close {
                    return Ok(());
                }
            }
        }
    }
}

async fn dispatch(
    session: &Arc<Session>,
    ctx: &Arc<SessionContext>,
    request: &Request,
) -> Result<serde_json::Value, StratumError> {
    match request.method.as_str() {
        "login" => handle_login(session, ctx, request).await,
        "getjob" => handle_getjob(session, ctx, request).await,
        "submit" => handle_submit(session, ctx, request).await,
        "keepalived" => Ok(StatusResult::keepalived()),
        other => {
            tracing::debug!(method = other, "unknown method");
            Err(StratumError::invalid_method())
        }
    }
}

async fn handle_login(
    session: &Arc<Session>,
    ctx: &Arc<SessionContext>,
    request: &Request,
) -> Result<serde_json::Value, StratumError> {
    let params: LoginParams =
        serde_json::from_value(request.params.clone()).map_err(|_| StratumError::invalid_method())?;

    if !ctx.config.bypass_address_validation {
        let valid_shape = params.login.len() == ctx.config.address.len()
            && params.login.chars().next() == ctx.config.address.chars().next();
        if !valid_shape || !hashport::validate_address(&params.login) {
            return Err(StratumError::invalid_address());
        }
    }

    let miner = ctx
        .state
        .miners
        .get(&params.login)
        .unwrap_or_else(|| Arc::new(Miner::new(params.login.clone(), session.ip.clone())));
    miner.heartbeat();
    ctx.state.miners.set(params.login.clone(), miner.clone());
    session.set_miner(miner.clone());

    let template = ctx
        .refresher
        .current_template()
        .ok_or_else(StratumError::job_not_ready)?;
    let job = session
        .get_job(&template)
        .map_err(|_| StratumError::job_not_ready())?;

    Ok(serde_json::to_value(LoginResult {
        id: params.login,
        status: "OK",
        job,
    })
    .unwrap())
}

async fn handle_getjob(
    session: &Arc<Session>,
    ctx: &Arc<SessionContext>,
    request: &Request,
) -> Result<serde_json::Value, StratumError> {
    let params: GetJobParams =
        serde_json::from_value(request.params.clone()).map_err(|_| StratumError::invalid_method())?;
    let miner = ctx.state.miners.get(&params.id).ok_or_else(StratumError::unauthenticated)?;
    miner.heartbeat();

    let template = ctx
        .refresher
        .current_template()
        .ok_or_else(StratumError::job_not_ready)?;
    let job = session
        .get_job(&template)
        .map_err(|_| StratumError::job_not_ready())?;
    Ok(serde_json::to_value(job).unwrap())
}

async fn handle_submit(
    session: &Arc<Session>,
    ctx: &Arc<SessionContext>,
    request: &Request,
) -> Result<serde_json::Value, StratumError> {
    let params: SubmitParams =
        serde_json::from_value(request.params.clone()).map_err(|_| StratumError::invalid_method())?;
    let miner = ctx
        .state
        .miners
        .get(&params.id)
        .ok_or_else(StratumError::unauthenticated)?;
    miner.heartbeat();

    let job = session
        .find_job(&params.job_id)
        .ok_or_else(StratumError::invalid_job_id)?;

    if !is_valid_nonce_format(&params.nonce) {
        miner.invalid_shares.fetch_add(1, Ordering::Relaxed);
        return Err(StratumError::malformed_nonce());
    }
    let nonce = params.nonce.as_str();

    if job.submit(nonce) {
        miner.invalid_shares.fetch_add(1, Ordering::Relaxed);
        return Err(StratumError::duplicate_share());
    }

    let template = ctx
        .refresher
        .current_template()
        .ok_or_else(StratumError::job_not_ready)?;
    if job.height != template.height {
        miner.stale_shares.fetch_add(1, Ordering::Relaxed);
        return Err(StratumError::block_expired());
    }

    ShareValidator::validate(
        &ctx.state,
        &ctx.upstream_pool,
        &ctx.broadcaster,
        &ctx.endpoint,
        &miner,
        &job,
        &template.buffer,
        template.reserved_offset,
        &template.difficulty,
        template.height,
        nonce,
        &params.result,
        ctx.config.bypass_share_validation,
    )
    .await?;

    Ok(StatusResult::ok())
}

/// Matches the wire format exactly: 8 lowercase hex digits. Uppercase hex is
/// rejected as malformed rather than silently folded to lowercase.
fn is_valid_nonce_format(nonce: &str) -> bool {
    nonce.len() == 8 && nonce.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

fn until(last_activity_ms: i64, timeout: std::time::Duration) -> std::time::Duration {
    let elapsed_ms = (now_ms() - last_activity_ms).max(0) as u64;
    timeout.saturating_sub(std::time::Duration::from_millis(elapsed_ms))
}
