#![allow(dead_code)]

pub mod test_server {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::sync::{Arc, Once};
    use std::time::Duration;

    use waypost::server::{HttpServer, ServerHandle};
    use waypost::Dispatcher;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }

    /// Start `dispatcher` on a free local port.
    pub fn start(dispatcher: Dispatcher) -> (ServerHandle, SocketAddr) {
        setup_may_runtime();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let handle = HttpServer::new(Arc::new(dispatcher))
            .bind(addr.to_string())
            .start()
            .unwrap();
        handle.wait_ready().unwrap();
        (handle, addr)
    }

    pub fn send_request(addr: &SocketAddr, req: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req.as_bytes()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let mut buf = Vec::new();
        loop {
            let mut tmp = [0u8; 1024];
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(e) => panic!("read error: {e:?}"),
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Split a raw response into status, lowercased headers and body.
    pub fn parse_response(resp: &str) -> (u16, Vec<(String, String)>, String) {
        let (head, body) = resp.split_once("\r\n\r\n").unwrap_or((resp, ""));
        let mut lines = head.lines();
        let status = lines
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse().ok())
            .unwrap_or(0);
        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();
        (status, headers, body.to_string())
    }
}

pub mod fixtures {
    use std::sync::{Arc, Mutex};

    use serde_json::{json, Value};
    use waypost::config::AppConfig;
    use waypost::controller::{Args, RequestContext};
    use waypost::error::DispatchError;
    use waypost::responses::Reply;
    use waypost::scaffold::MemoryStore;
    use waypost::server::{Request, Response};
    use waypost::view::TemplateEngine;
    use waypost::AppBuilder;

    /// Builder over default configuration, independent of the process-wide copy.
    pub fn builder() -> AppBuilder {
        AppBuilder::new().config(AppConfig::default())
    }

    pub fn ok(_ctx: &mut RequestContext, _args: &Args) -> Result<Reply, DispatchError> {
        Ok(Reply::Text("ok".into()))
    }

    pub fn widget_store(names: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new(
            "Widget",
            json!({"name": "", "count": 0, "active": false}),
        ));
        for (i, name) in names.iter().enumerate() {
            store
                .insert(json!({"name": name, "count": i, "active": true}))
                .unwrap();
        }
        store
    }

    pub fn as_admin(req: Request) -> Request {
        req.with_header("x-user-email", "root@example.com")
            .with_header("x-user-admin", "true")
    }

    pub fn body_json(response: &Response) -> Value {
        serde_json::from_slice(&response.body).unwrap()
    }

    /// `name=value` of the session cookie set on `response`.
    pub fn session_cookie(response: &Response) -> String {
        response
            .header("set-cookie")
            .and_then(|c| c.split(';').next())
            .unwrap()
            .to_string()
    }

    /// Records what was rendered: the candidate names and the variables.
    #[derive(Default)]
    pub struct RecordingEngine {
        pub calls: Mutex<Vec<(Vec<String>, Value)>>,
    }

    impl RecordingEngine {
        pub fn last(&self) -> (Vec<String>, Value) {
            self.calls.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl TemplateEngine for RecordingEngine {
        fn render(&self, names: &[String], context: &Value) -> Result<String, DispatchError> {
            self.calls
                .lock()
                .unwrap()
                .push((names.to_vec(), context.clone()));
            Ok(format!("rendered {}", names.first().cloned().unwrap_or_default()))
        }
    }
}
