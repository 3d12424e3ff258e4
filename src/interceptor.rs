use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use cookie::Cookie;
use tonic::metadata::{Ascii, MetadataMap, MetadataValue};
use tonic::service::Interceptor;
use tonic::{Request, Status};
use tracing::debug;

const SET_COOKIE: &str = "set-cookie";
const COOKIE: &str = "cookie";

/// Cookies handed out by the server, replayed on every later call.
///
/// Attributes (`Path`, `Max-Age`, ...) are dropped and cookies never expire
/// within a run.
#[derive(Default, Clone, Debug)]
pub struct CookieJar(Arc<RwLock<BTreeMap<String, String>>>);

impl CookieJar {
    pub fn store_from(&self, headers: &MetadataMap) {
        for value in headers.get_all(SET_COOKIE).iter() {
            let Ok(raw) = value.to_str() else {
                continue;
            };
            match Cookie::parse(raw) {
                Ok(cookie) => {
                    debug!(cookie = %cookie.name(), "storing session cookie");
                    self.write()
                        .insert(cookie.name().to_string(), cookie.value_trimmed().to_string());
                }
                Err(e) => debug!(error = %e, "ignoring malformed set-cookie header"),
            }
        }
    }

    /// `a=1; b=2`, or `None` while the jar is empty.
    pub fn header_value(&self) -> Option<String> {
        let cookies = self.read();
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|(name, value)| {
                    Cookie::new(name.as_str(), value.as_str())
                        .stripped()
                        .to_string()
                })
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.read().get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.0.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, String>> {
        self.0.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Writes the jar's cookies onto every outgoing request.
#[derive(Clone, Debug)]
pub struct CookieInterceptor {
    jar: CookieJar,
}

impl CookieInterceptor {
    pub fn new(jar: CookieJar) -> Self {
        Self { jar }
    }
}

impl Interceptor for CookieInterceptor {
    fn call(&mut self, mut req: Request<()>) -> std::result::Result<Request<()>, Status> {
        if let Some(cookies) = self.jar.header_value() {
            let value: MetadataValue<Ascii> = cookies
                .parse()
                .map_err(|_| Status::internal("stored cookie is not a valid header value"))?;
            req.metadata_mut().insert(COOKIE, value);
        }
        Ok(req)
    }
}
