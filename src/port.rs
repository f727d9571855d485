//! Serial port acquisition with two open strategies.
//!
//! On Linux the port is first opened through a raw file descriptor with
//! termios configured for raw 8N1 and a decisecond read timeout; this keeps
//! latency low and lets a stop request force-close the descriptor to unblock
//! a pending read. If that fails (or on other platforms) the portable
//! `serialport` crate is used instead, relying on its read timeout. When
//! every strategy fails, the caller gets one aggregated error naming each
//! attempt.

use std::io;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::error::{AcquireError, Result};

/// Read timeout shared by both strategies.
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Termios VTIME value, in deciseconds (10 = 1 s), for the direct strategy.
#[cfg(target_os = "linux")]
const VTIME_DECISECONDS: libc::cc_t = 10;

/// Delay after opening through the serial library, letting the adapter
/// settle before stale input is flushed.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

const CHUNK_SIZE: usize = 512;

/// Byte transport produced by an open strategy. `read_chunk` returning 0
/// means the read timed out with no data; that is not an error.
trait LinePort: Send {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// One way of opening the device. Strategies are tried in order and their
/// failures aggregated, so callers never inspect which one succeeded.
trait OpenStrategy {
    fn name(&self) -> &'static str;
    fn open(&self, device: &str, baud: u32, shutdown: &ShutdownHandle)
        -> io::Result<Box<dyn LinePort>>;
}

fn strategies() -> Vec<Box<dyn OpenStrategy>> {
    #[cfg(target_os = "linux")]
    {
        vec![Box::new(DirectTermios), Box::new(SerialCrate)]
    }
    #[cfg(not(target_os = "linux"))]
    {
        vec![Box::new(SerialCrate)]
    }
}

/// Cross-thread handle that can force-close the underlying descriptor to
/// unblock a read pending on it. Closing twice is a no-op.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    fd: Arc<AtomicI32>,
}

impl ShutdownHandle {
    fn new() -> Self {
        Self {
            fd: Arc::new(AtomicI32::new(-1)),
        }
    }

    fn register(&self, fd: i32) {
        self.fd.store(fd, Ordering::SeqCst);
    }

    /// Close the registered descriptor now, if any. Only the direct
    /// strategy registers one; the library strategy's bounded read timeout
    /// unblocks its loop on its own.
    pub fn close_now(&self) {
        let fd = self.fd.swap(-1, Ordering::SeqCst);
        #[cfg(unix)]
        if fd >= 0 {
            unsafe {
                libc::close(fd);
            }
        }
        #[cfg(not(unix))]
        let _ = fd;
    }
}

/// Line-oriented serial connection with dual-strategy open.
pub struct PortAcquirer {
    device: String,
    baud: u32,
    backend: Option<Box<dyn LinePort>>,
    pending: Vec<u8>,
    shutdown: ShutdownHandle,
}

impl PortAcquirer {
    pub fn new(device: &str, baud: u32) -> Self {
        Self {
            device: device.to_string(),
            baud,
            backend: None,
            pending: Vec::new(),
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    /// Handle for force-closing the port from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Try each open strategy in order. On total failure the error message
    /// carries every strategy's failure.
    pub fn open(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        for strategy in strategies() {
            match strategy.open(&self.device, self.baud, &self.shutdown) {
                Ok(backend) => {
                    info!("opened {} using {}", self.device, strategy.name());
                    self.backend = Some(backend);
                    self.pending.clear();
                    return Ok(());
                }
                Err(err) => {
                    warn!("{} open of {} failed: {err}", strategy.name(), self.device);
                    failures.push(format!("{}: {err}", strategy.name()));
                }
            }
        }
        Err(AcquireError::Open {
            device: self.device.clone(),
            details: failures.join("; "),
        })
    }

    /// Read one line. `Ok(None)` means the read timed out before a full
    /// line arrived; partial data is kept for the next call.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        let Some(backend) = self.backend.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port not open"));
        };
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = self.pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw).trim().to_string();
                if line.is_empty() {
                    continue;
                }
                return Ok(Some(line));
            }
            let mut chunk = [0u8; CHUNK_SIZE];
            let n = backend.read_chunk(&mut chunk)?;
            if n == 0 {
                return Ok(None);
            }
            self.pending.extend_from_slice(&chunk[..n]);
        }
    }

    /// Release the underlying handle. Safe to call repeatedly and after
    /// failures; all OS resources are released either way.
    pub fn close(&mut self) {
        self.shutdown.close_now();
        self.backend = None;
        self.pending.clear();
    }
}

impl Drop for PortAcquirer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Candidate serial devices currently present on the system.
pub fn available_ports() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(err) => {
            warn!("serial port enumeration failed: {err}");
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Direct strategy: raw fd + termios (Linux).
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
struct DirectTermios;

#[cfg(target_os = "linux")]
impl OpenStrategy for DirectTermios {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn open(
        &self,
        device: &str,
        baud: u32,
        shutdown: &ShutdownHandle,
    ) -> io::Result<Box<dyn LinePort>> {
        let c_device = std::ffi::CString::new(device)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "device path contains NUL"))?;
        let fd = unsafe {
            libc::open(
                c_device.as_ptr(),
                libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        if let Err(err) = configure_raw(fd, baud) {
            unsafe {
                libc::close(fd);
            }
            return Err(err);
        }
        shutdown.register(fd);
        Ok(Box::new(DirectPort {
            fd: shutdown.fd.clone(),
        }))
    }
}

/// Raw 8N1, VMIN=0/VTIME=10, non-blocking flag cleared after setup, both
/// buffers flushed.
#[cfg(target_os = "linux")]
fn configure_raw(fd: i32, baud: u32) -> io::Result<()> {
    unsafe {
        let mut tio: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tio) != 0 {
            return Err(io::Error::last_os_error());
        }
        tio.c_iflag = 0;
        tio.c_oflag = 0;
        tio.c_lflag = 0;
        tio.c_cflag = libc::CS8 | libc::CREAD | libc::CLOCAL;
        tio.c_cc[libc::VMIN] = 0;
        tio.c_cc[libc::VTIME] = VTIME_DECISECONDS;
        let speed = baud_constant(baud);
        libc::cfsetispeed(&mut tio, speed);
        libc::cfsetospeed(&mut tio, speed);
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(io::Error::last_os_error());
        }
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
        libc::tcflush(fd, libc::TCIOFLUSH);
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn baud_constant(baud: u32) -> libc::speed_t {
    match baud {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        460_800 => libc::B460800,
        921_600 => libc::B921600,
        other => {
            warn!("no termios constant for {other} baud, using 115200");
            libc::B115200
        }
    }
}

/// Shares the descriptor slot with [`ShutdownHandle`], so a force-close from
/// another thread and this port's own drop never double-close.
#[cfg(target_os = "linux")]
struct DirectPort {
    fd: Arc<AtomicI32>,
}

#[cfg(target_os = "linux")]
impl LinePort for DirectPort {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let fd = self.fd.load(Ordering::SeqCst);
        if fd < 0 {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            // VMIN=0/VTIME>0: zero bytes means the timeout elapsed.
            Ok(n as usize)
        }
    }
}

#[cfg(target_os = "linux")]
impl Drop for DirectPort {
    fn drop(&mut self) {
        let fd = self.fd.swap(-1, Ordering::SeqCst);
        if fd >= 0 {
            unsafe {
                libc::close(fd);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fallback strategy: the portable serialport crate.
// ---------------------------------------------------------------------------

struct SerialCrate;

impl OpenStrategy for SerialCrate {
    fn name(&self) -> &'static str {
        "serialport"
    }

    fn open(
        &self,
        device: &str,
        baud: u32,
        _shutdown: &ShutdownHandle,
    ) -> io::Result<Box<dyn LinePort>> {
        let port = serialport::new(device, baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(io::Error::from)?;
        std::thread::sleep(SETTLE_DELAY);
        if let Err(err) = port.clear(serialport::ClearBuffer::Input) {
            warn!("could not flush stale input on {device}: {err}");
        }
        Ok(Box::new(FallbackPort { port }))
    }
}

struct FallbackPort {
    port: Box<dyn serialport::SerialPort>,
}

impl LinePort for FallbackPort {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use std::io::Read;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(err) => Err(err),
        }
    }
}
