//! RTP to WebRTC restream server example
//!
//! Run with: cargo run --example restream_server --features webrtc [SIGNAL_ADDR] [RTP_ADDR]
//!
//! Examples:
//!   cargo run --example restream_server --features webrtc
//!       # signaling on 0.0.0.0:8080, RTP on 0.0.0.0:5600
//!   cargo run --example restream_server --features webrtc localhost:8081 127.0.0.1:5700
//!
//! ## Sending video
//!
//! With gstreamer:
//!   gst-launch-1.0 videotestsrc ! x264enc tune=zerolatency ! rtph264pay ! udpsink host=127.0.0.1 port=5600
//!
//! ## Watching
//!
//! POST the browser's SDP offer as the raw request body to `http://SIGNAL_ADDR/`;
//! the response body is the SDP answer. Every POST is an independent viewer.

use std::net::SocketAddr;
use std::sync::Arc;

use fpv_restream::engine::webrtc_rs::{WebRtcConnection, WebRtcEngine};
use fpv_restream::restreamer::SessionRequest;
use fpv_restream::{
    ChannelTransport, MarkerFileMode, RestreamHost, Restreamer, RestreamerConfig, SourceConfig,
    StaticMode,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const MAX_REQUEST: usize = 64 * 1024;

fn parse_addr(arg: &str, default_port: u16) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }

    Err(format!(
        "Invalid address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: restream_server [SIGNAL_ADDR] [RTP_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  SIGNAL_ADDR  SDP offer/answer endpoint (default: 0.0.0.0:8080)");
    eprintln!("  RTP_ADDR     UDP address receiving RTP video (default: 0.0.0.0:5600)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RESTREAM_AIR=1   behave like an air unit (restreamer disabled)");
    eprintln!("  RESTREAM_MARKER  ground marker file to check instead of forcing ground mode");
}

/// Read one HTTP request and return its body
async fn read_body(sock: &mut TcpStream) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    loop {
        let n = sock.read(&mut chunk).await?;
        if n == 0 {
            return Err("connection closed mid-request".into());
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_REQUEST {
            return Err("request too large".into());
        }

        let text = String::from_utf8_lossy(&buf);
        let Some(split) = text.find("\r\n\r\n") else {
            continue;
        };

        let content_length = text[..split]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        let body = &buf[split + 4..];
        if body.len() >= content_length {
            return Ok(String::from_utf8_lossy(&body[..content_length]).into_owned());
        }
    }
}

async fn respond(sock: &mut TcpStream, status: &str, content_type: &str, body: &[u8]) -> std::io::Result<()> {
    let header = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\n\r\n",
        status,
        content_type,
        body.len()
    );
    sock.write_all(header.as_bytes()).await?;
    sock.write_all(body).await
}

async fn handle_viewer(
    mut sock: TcpStream,
    peer: SocketAddr,
    requests: mpsc::Sender<SessionRequest<WebRtcConnection>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let offer = read_body(&mut sock).await?;
    if offer.is_empty() {
        respond(&mut sock, "400 Bad Request", "text/plain", b"missing SDP offer").await?;
        return Ok(());
    }

    let (request, reply) = SessionRequest::new();
    requests.send(request).await.map_err(|_| "restreamer stopped")?;
    let connection = reply.await??;

    let answer = connection.negotiate(offer).await?;
    tracing::info!(peer = %peer, conn = %connection.inner().get_stats_id(), "Viewer negotiated");

    respond(&mut sock, "200 OK", "application/sdp", answer.as_bytes()).await?;
    Ok(())
}

async fn serve_signaling(
    listener: TcpListener,
    requests: mpsc::Sender<SessionRequest<WebRtcConnection>>,
) -> std::io::Result<()> {
    loop {
        let (sock, peer) = listener.accept().await?;
        let requests = requests.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_viewer(sock, peer, requests).await {
                tracing::warn!(peer = %peer, error = %e, "Signaling request failed");
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let parsed = (
        args.get(1).map(|a| parse_addr(a, 8080)).transpose(),
        args.get(2).map(|a| parse_addr(a, 5600)).transpose(),
    );
    let (signal_addr, rtp_addr) = match parsed {
        (Ok(signal), Ok(rtp)) => (
            signal.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080))),
            rtp.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 5600))),
        ),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fpv_restream=debug".parse()?)
                .add_directive("restream_server=debug".parse()?),
        )
        .init();

    let engine = Arc::new(WebRtcEngine::new()?);
    let (transport, requests) = ChannelTransport::<WebRtcConnection>::new(32);
    let config = RestreamerConfig::default().source(SourceConfig::with_addr(rtp_addr));

    let build = || Restreamer::with_udp_source(engine, Arc::new(transport), config);
    let host = match std::env::var("RESTREAM_MARKER") {
        Ok(path) => RestreamHost::new(&MarkerFileMode::new(path), build),
        Err(_) => {
            let ground = std::env::var("RESTREAM_AIR").is_err();
            RestreamHost::new(&StaticMode { ground }, build)
        }
    };

    if !host.is_enabled() {
        println!("Air mode: nothing to restream");
        return Ok(());
    }

    host.start().await?;

    let listener = TcpListener::bind(signal_addr).await?;
    println!("Receiving RTP on udp://{}", rtp_addr);
    println!("Signaling on http://{}", signal_addr);
    println!();

    tokio::select! {
        result = serve_signaling(listener, requests) => {
            if let Err(e) = result {
                eprintln!("Signaling error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    if let Some(restreamer) = host.restreamer() {
        let stats = restreamer.stats();
        println!(
            "Sessions: registered={} active={} frames_broadcast={}",
            stats.registered, stats.active, stats.frames_broadcast
        );
    }
    host.stop()?;

    Ok(())
}
