use crate::error::{Result, TunerError};
use crate::estimation::*;
use log::{debug, trace};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use reqwest::Url;
use std::io::Read;
use std::time::Duration;

/// Largest response body accepted from the estimation service.
pub const MAX_BODY_BYTES: u64 = 64 * 1024;

/// `EstimationService` over HTTP.
///
/// Idle connections are not pooled: the backend is polled with one GET per
/// tick and a fresh connection each time. Only `http://` base URLs are
/// supported.
#[derive(Debug, Clone)]
pub struct HttpEstimationClient {
    /// Base URL without trailing slash
    base: String,
    client: Client,
}

impl HttpEstimationClient {
    /// `timeout` bounds connect, send and body read of every request.
    /// None waits indefinitely.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let url = Url::parse(base_url.trim())
            .map_err(|e| TunerError::InvalidUrl(format!("{} ({})", base_url, e)))?;
        if url.scheme() != "http" {
            return Err(TunerError::InvalidUrl(format!(
                "{} (only http:// is supported)",
                base_url
            )));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(TunerError::InvalidUrl(format!("{} (missing host)", base_url)));
        }

        let mut builder = Client::builder()
            .pool_max_idle_per_host(0)
            .timeout(timeout);
        if let Some(t) = timeout {
            builder = builder.connect_timeout(t);
        }
        Ok(Self {
            base: url.as_str().trim_end_matches('/').to_string(),
            client: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// GET `path` and return the body of a 2xx response.
    /// Bodies over `MAX_BODY_BYTES` are rejected as malformed.
    pub fn get(&self, path: &str) -> Result<Vec<u8>> {
        let url = format!("{}{}", self.base, path);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(TunerError::HttpStatus {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        if let Some(len) = response.content_length() {
            if len > MAX_BODY_BYTES {
                return Err(TunerError::MalformedResponse(format!(
                    "{} announced a {} byte body",
                    path, len
                )));
            }
        }

        let mut body = Vec::new();
        response.take(MAX_BODY_BYTES + 1).read_to_end(&mut body)?;
        if body.len() as u64 > MAX_BODY_BYTES {
            return Err(TunerError::MalformedResponse(format!(
                "{} body exceeds {} bytes",
                path, MAX_BODY_BYTES
            )));
        }
        trace!("GET {} → {} ({} bytes)", url, status, body.len());
        Ok(body)
    }
}

impl EstimationService for HttpEstimationClient {
    fn start_session(&self) -> Result<()> {
        self.get(START_PATH)?;
        debug!("Estimation session started at {}", self.base);
        Ok(())
    }

    fn estimate(&self) -> Result<EstimateReading> {
        let body = self.get(ESTIMATE_PATH)?;
        EstimateReading::decode(&body)
    }

    fn stop_session(&self) -> Result<()> {
        self.get(STOP_PATH)?;
        debug!("Estimation session stopped at {}", self.base);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve `responses` to consecutive connections, returning the request lines seen.
    fn fake_backend(responses: Vec<String>) -> (String, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut first = String::new();
                reader.read_line(&mut first).unwrap();
                seen.push(first.trim().to_string());
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap() == 0 || line.trim().is_empty() {
                        break;
                    }
                }
                let _ = stream.write_all(response.as_bytes());
            }
            seen
        });
        (url, handle)
    }

    fn json_response(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    fn client(url: &str) -> HttpEstimationClient {
        HttpEstimationClient::new(url, Some(Duration::from_secs(2))).unwrap()
    }

    #[test]
    fn test_base_url_validation() {
        assert_eq!(
            HttpEstimationClient::new("http://127.0.0.1:5000", None)
                .unwrap()
                .base_url(),
            "http://127.0.0.1:5000"
        );
        assert_eq!(
            HttpEstimationClient::new("http://tuner.local/api/", None)
                .unwrap()
                .base_url(),
            "http://tuner.local/api"
        );
        for bad in ["https://x", "http://:80", "http://host:port", "tuner.local:5000", ""] {
            assert!(
                matches!(HttpEstimationClient::new(bad, None), Err(TunerError::InvalidUrl(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_session_calls_and_estimate() {
        let (url, server) = fake_backend(vec![
            json_response(r#"{"status": "started"}"#),
            json_response(r#"{"estimated_pitch": 109.5, "decibels": -18.25}"#),
            json_response("ok"),
        ]);
        let client = client(&url);
        client.start_session().unwrap();
        let r = client.estimate().unwrap();
        assert_eq!(r.pitch_hz(), 109.5);
        assert_eq!(r.decibels, Some(-18.25));
        client.stop_session().unwrap();

        let seen = server.join().unwrap();
        assert_eq!(
            seen,
            vec![
                "GET /start_estimation HTTP/1.1",
                "GET /estimate_pitch HTTP/1.1",
                "GET /stop_estimation HTTP/1.1",
            ]
        );
    }

    #[test]
    fn test_prefix_is_prepended() {
        let (url, server) =
            fake_backend(vec![json_response(r#"{"estimated_pitch": 0, "decibels": -90}"#)]);
        let client = client(&format!("{}/tuner", url));
        assert!(client.estimate().unwrap().is_silent());
        assert_eq!(server.join().unwrap(), vec!["GET /tuner/estimate_pitch HTTP/1.1"]);
    }

    #[test]
    fn test_chunked_body() {
        let (url, server) = fake_backend(vec![
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
             14\r\n{\"estimated_pitch\": \r\n\
             12\r\n82.0, \"decibels\": \r\n\
             4\r\n-30}\r\n\
             0\r\n\r\n"
                .to_string(),
        ]);
        let r = client(&url).estimate().unwrap();
        assert_eq!(r, EstimateReading::new(82.0, -30.0));
        server.join().unwrap();
    }

    #[test]
    fn test_huge_content_length_is_malformed() {
        let (url, server) = fake_backend(vec![
            "HTTP/1.1 200 OK\r\nContent-Length: 9000000000000000000\r\nConnection: close\r\n\r\n{}"
                .to_string(),
        ]);
        let err = client(&url).estimate().unwrap_err();
        assert!(matches!(err, TunerError::MalformedResponse(_)), "got {:?}", err);
        server.join().unwrap();
    }

    #[test]
    fn test_bogus_chunk_size_is_an_error_not_a_panic() {
        let (url, server) = fake_backend(vec![
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
             ffffffffffffffff\r\n{\"estimated_pitch\": 1"
                .to_string(),
        ]);
        let worker = thread::spawn(move || client(&url).estimate());
        let outcome = worker.join().expect("estimate must not panic");
        assert!(outcome.is_err());
        server.join().unwrap();
    }

    #[test]
    fn test_oversized_chunked_body_is_malformed() {
        let chunk = "x".repeat(MAX_BODY_BYTES as usize + 10);
        let (url, server) = fake_backend(vec![format!(
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n{:x}\r\n{}\r\n0\r\n\r\n",
            chunk.len(),
            chunk
        )]);
        let err = client(&url).estimate().unwrap_err();
        assert!(matches!(err, TunerError::MalformedResponse(_)), "got {:?}", err);
        server.join().unwrap();
    }

    #[test]
    fn test_body_until_close() {
        let (url, server) = fake_backend(vec![
            "HTTP/1.0 200 OK\r\n\r\n{\"estimated_pitch\": 440.0, \"decibels\": -12.0}".to_string(),
        ]);
        let r = client(&url).estimate().unwrap();
        assert_eq!(r.pitch_hz(), 440.0);
        server.join().unwrap();
    }

    #[test]
    fn test_error_status() {
        let (url, server) = fake_backend(vec![
            "HTTP/1.1 500 INTERNAL SERVER ERROR\r\nContent-Length: 5\r\nConnection: close\r\n\r\noops!"
                .to_string(),
        ]);
        let err = client(&url).estimate().unwrap_err();
        assert!(
            matches!(err, TunerError::HttpStatus { status: 500, ref path } if path == "/estimate_pitch"),
            "got {:?}",
            err
        );
        server.join().unwrap();
    }

    #[test]
    fn test_connection_refused_is_http_error() {
        // Bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let client = HttpEstimationClient::new(
            &format!("http://127.0.0.1:{}", port),
            Some(Duration::from_millis(500)),
        )
        .unwrap();
        assert!(matches!(client.estimate(), Err(TunerError::Http(_))));
    }
}
