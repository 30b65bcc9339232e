#![allow(non_snake_case)]

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use dlopen::wrapper::{Container, WrapperApi};

use crate::protocol::{ProtocolError, ScpiRequest, ScpiResponse, TransportError};
use crate::transport::{strip_termination, terminate};
use crate::Error;

type ViStatus = i32;
type ViAccessMode = u32;
type ViSession = u32;
type ViObject = u32;
type ViAttr = u32;
// pointer sized: ViUInt64 on 64 bit VISA, ViUInt32 otherwise
type ViAttrState = usize;

const VI_SUCCESS_MAX_CNT: ViStatus = 0x3FFF0006;
const VI_ERROR_TMO: ViStatus = 0xBFFF0015_u32 as ViStatus;

const VI_ATTR_TERMCHAR: ViAttr = 0x3FFF0018;
const VI_ATTR_TMO_VALUE: ViAttr = 0x3FFF001A;
const VI_ATTR_TERMCHAR_EN: ViAttr = 0x3FFF0038;

const VI_NO_LOCK: ViAccessMode = 0;
const VI_TRUE: ViAttrState = 1;
const VI_TMO_INFINITE: u32 = 0xFFFFFFFF;

const READ_CHUNK: usize = 4096;

#[derive(WrapperApi)]
struct Api {
    viOpenDefaultRM: unsafe extern "system" fn(vi: *mut ViSession) -> ViStatus,
    viOpen: unsafe extern "system" fn(
        session: ViSession,
        rsrc: *const c_char,
        access_mode: ViAccessMode,
        timeout: u32,
        vi: *mut ViObject,
    ) -> ViStatus,
    viClose: unsafe extern "system" fn(vi: ViObject) -> ViStatus,
    viClear: unsafe extern "system" fn(vi: ViSession) -> ViStatus,
    viSetAttribute: unsafe extern "system" fn(vi: ViObject, attr: ViAttr, value: ViAttrState) -> ViStatus,
    viStatusDesc: unsafe extern "system" fn(vi: ViObject, status: ViStatus, desc: *mut c_char) -> ViStatus,
    viRead: unsafe extern "system" fn(vi: ViSession, buf: *mut u8, cnt: u32, cnt_ret: *mut u32) -> ViStatus,
    viWrite: unsafe extern "system" fn(vi: ViSession, buf: *const u8, cnt: u32, cnt_ret: *mut u32) -> ViStatus,
}

/// A loaded VISA library together with its default resource manager.
pub struct Visa {
    api: Container<Api>,
    rm: ViSession,
    path: PathBuf,
}

lazy_static! {
    static ref LIBRARIES: Mutex<HashMap<PathBuf, Arc<Visa>>> = Mutex::new(HashMap::new());
}

/// Load the VISA library at `path`, or the platform default. Libraries stay
/// loaded for the lifetime of the process and are shared between sessions.
pub fn load(path: Option<&Path>) -> crate::Result<Arc<Visa>> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(super::DEFAULT_VISA_LIBRARY));
    let mut libraries = LIBRARIES
        .lock()
        .map_err(|_| Error::internal(anyhow!("VISA library cache is poisoned")))?;
    if let Some(visa) = libraries.get(&path) {
        return Ok(visa.clone());
    }
    let visa = Arc::new(Visa::load(path.clone())?);
    libraries.insert(path, visa.clone());
    Ok(visa)
}

impl Visa {
    fn load(path: PathBuf) -> crate::Result<Self> {
        let api: Container<Api> = unsafe { Container::load(&path) }.map_err(|err| {
            Error::transport(anyhow!("Cannot load VISA library `{}`: {}", path.display(), err))
        })?;
        let mut rm: ViSession = 0;
        let status = unsafe { api.viOpenDefaultRM(&mut rm as *mut ViSession) };
        if status < 0 {
            return Err(Error::transport(TransportError::Visa {
                code: status,
                description: "Could not open resource manager".to_string(),
            }));
        }
        log::debug!("Loaded VISA library `{}`", path.display());
        Ok(Visa { api, rm, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn describe_status(&self, status: ViStatus) -> String {
        // VISA descriptions are at most 256 characters including the terminator
        let mut data = [0 as c_char; 256];
        unsafe {
            self.api.viStatusDesc(self.rm, status, data.as_mut_ptr());
            CStr::from_ptr(data.as_ptr()).to_string_lossy().into_owned()
        }
    }

    fn error(&self, status: ViStatus) -> Error {
        if status == VI_ERROR_TMO {
            return Error::protocol_timeout();
        }
        Error::transport(TransportError::Visa {
            code: status,
            description: self.describe_status(status),
        })
    }

    fn check(&self, status: ViStatus) -> crate::Result<ViStatus> {
        if status < 0 {
            Err(self.error(status))
        } else {
            Ok(status)
        }
    }
}

impl Drop for Visa {
    fn drop(&mut self) {
        let status = unsafe { self.api.viClose(self.rm) };
        if status < 0 {
            log::error!("Error closing resource manager: {}", self.describe_status(status));
        }
    }
}

/// Timeout value in milliseconds as expected by `VI_ATTR_TMO_VALUE`.
fn timeout_millis(timeout: Duration) -> u32 {
    let millis = timeout.as_millis();
    if millis >= VI_TMO_INFINITE as u128 {
        VI_TMO_INFINITE
    } else {
        millis as u32
    }
}

/// A blocking VISA session, closed on drop.
pub struct Instrument {
    visa: Arc<Visa>,
    instr: ViObject,
    addr: String,
}

impl Instrument {
    pub fn open(visa: Arc<Visa>, addr: &str, timeout: Duration) -> crate::Result<Self> {
        let cstr = CString::new(addr).map_err(Error::argument)?;
        let mut handle: ViObject = 0;
        let status = unsafe {
            visa.api.viOpen(
                visa.rm,
                cstr.as_ptr(),
                VI_NO_LOCK,
                timeout_millis(timeout),
                &mut handle as *mut ViObject,
            )
        };
        visa.check(status)?;
        let ret = Instrument {
            visa,
            instr: handle,
            addr: addr.to_string(),
        };
        ret.set_timeout(timeout)?;
        ret.set_attribute(VI_ATTR_TERMCHAR, b'\n' as ViAttrState)?;
        ret.set_attribute(VI_ATTR_TERMCHAR_EN, VI_TRUE)?;
        Ok(ret)
    }

    fn set_attribute(&self, attr: ViAttr, value: ViAttrState) -> crate::Result<()> {
        let status = unsafe { self.visa.api.viSetAttribute(self.instr, attr, value) };
        self.visa.check(status).map(|_| ())
    }

    pub fn set_timeout(&self, timeout: Duration) -> crate::Result<()> {
        self.set_attribute(VI_ATTR_TMO_VALUE, timeout_millis(timeout) as ViAttrState)
    }

    pub fn write(&self, msg: &str) -> crate::Result<()> {
        let msg = terminate(msg.to_string());
        log::debug!("{} write: {:?}", self.addr, msg);
        let mut data = msg.as_bytes();
        while !data.is_empty() {
            let mut written = 0_u32;
            let status = unsafe {
                self.visa
                    .api
                    .viWrite(self.instr, data.as_ptr(), data.len() as u32, &mut written as *mut u32)
            };
            self.visa.check(status)?;
            data = &data[written as usize..];
        }
        Ok(())
    }

    pub fn read_line(&self) -> crate::Result<String> {
        let mut ret = Vec::new();
        let mut chunk = [0_u8; READ_CHUNK];
        loop {
            let mut count = 0_u32;
            let status = unsafe {
                self.visa
                    .api
                    .viRead(self.instr, chunk.as_mut_ptr(), READ_CHUNK as u32, &mut count as *mut u32)
            };
            let status = self.visa.check(status)?;
            ret.extend_from_slice(&chunk[..count as usize]);
            if status != VI_SUCCESS_MAX_CNT {
                break;
            }
        }
        let line = String::from_utf8(ret).map_err(|_| Error::protocol(ProtocolError::Decode))?;
        log::debug!("{} read: {:?}", self.addr, line);
        Ok(strip_termination(line))
    }

    /// Flush the device's input and output buffers.
    pub fn clear(&self) -> crate::Result<()> {
        let status = unsafe { self.visa.api.viClear(self.instr) };
        self.visa.check(status).map(|_| ())
    }

    /// Run `req`. After a timeout the session is cleared so that a late
    /// reply is not picked up by the next read.
    pub fn handle_scpi(&self, req: ScpiRequest) -> crate::Result<ScpiResponse> {
        let ret = self.handle_scpi_inner(req);
        if let Err(err) = &ret {
            if err.is_timeout() {
                log::debug!("{} timed out, clearing session", self.addr);
                if let Err(x) = self.clear() {
                    log::warn!("Cannot clear {} after timeout: {}", self.addr, x);
                }
            }
        }
        ret
    }

    fn handle_scpi_inner(&self, req: ScpiRequest) -> crate::Result<ScpiResponse> {
        match req {
            ScpiRequest::Write(msg) => {
                self.write(&msg)?;
                Ok(ScpiResponse::Done)
            }
            ScpiRequest::QueryString(msg) => {
                self.write(&msg)?;
                self.read_line().map(ScpiResponse::String)
            }
            ScpiRequest::ReadLine => self.read_line().map(ScpiResponse::String),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Drop for Instrument {
    fn drop(&mut self) {
        let status = unsafe { self.visa.api.viClose(self.instr) };
        if status < 0 {
            log::error!(
                "Error closing instrument {}: {}",
                self.addr,
                self.visa.describe_status(status)
            );
        } else {
            log::debug!("Closed {}", self.addr);
        }
    }
}
