//! Basic usage example for scope-stp
//!
//! Run with: cargo run --example basic_usage

use scope_stp::codec::json;
use scope_stp::messages::{commands, services, ConsoleMessage, Severity, WindowInfo, WindowList};
use scope_stp::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Sink that completes a few bytes per call, like a congested socket
struct Congested {
    sent: Vec<u8>,
    per_call: usize,
}

impl DataSink for Congested {
    fn send_data(&mut self, data: &[u8]) -> Result<usize> {
        self.sent.extend_from_slice(data);
        Ok(data.len().min(self.per_call))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scope_stp=debug".into()),
        )
        .init();

    println!("scope-stp Basic Usage Example");
    println!("=============================");

    // Example 1: one payload in every format
    println!("\n1. Console message payloads:");
    let mut console = ConsoleMessage::new(1, 1_700_000_000_000, "Uncaught ReferenceError");
    console.set_uri("http://example.com/app.js");
    console.set_line(42);
    console.set_severity(Severity::Error);
    {
        let binary = codec::encode(&console, PayloadFormat::Binary)?;
        let text = codec::encode(&console, PayloadFormat::Json)?;
        println!("  binary: {} bytes {:02x?}", binary.len(), binary);
        println!("  json:   {}", String::from_utf8_lossy(&text));
        #[cfg(feature = "xml")]
        {
            let xml = codec::encode(&console, PayloadFormat::Xml)?;
            println!("  xml:    {}", String::from_utf8_lossy(&xml));
        }
    }

    // Example 2: a call and its response over a congested STP/1 stream
    println!("\n2. Call and response over STP/1:");
    let call = TransportMessage::call(services::WINDOW_MANAGER, commands::LIST_WINDOWS, 1);
    let mut response = TransportMessage::response_to(&call);
    let mut windows = WindowList::default();
    windows.windows = vec![WindowInfo::new(1, "Start"), WindowInfo::new(2, "Docs")];
    windows.set_active(WindowInfo::new(2, "Docs"));
    response.set_message(&windows)?;

    let mut writer = StpWriter::new(Congested {
        sent: Vec::new(),
        per_call: 5,
    });
    writer.enqueue_message(call)?;
    writer.enqueue_message(response)?;
    let mut acks = 0;
    while writer.pending() > 0 {
        let n = writer.pending().min(5);
        writer.on_data_sent(n)?;
        acks += 1;
    }
    let stream = writer.into_sink().sent;
    println!("  {} bytes written after {} acknowledgements", stream.len(), acks);

    let mut reader = StpReader::new(Vec::new());
    for piece in stream.chunks(7) {
        reader.on_data_ready(piece)?;
    }
    for message in reader.handler() {
        println!(
            "  received {:?} {}#{} tag={} payload={} bytes",
            message.kind,
            message.service_name,
            message.command_id,
            message.tag,
            message.payload.len()
        );
    }
    let mut decoded = WindowList::default();
    reader.handler()[1].parse_message(&mut decoded)?;
    println!(
        "  active window: {:?}",
        decoded.active().map(|w| w.title.as_str())
    );

    // Example 3: the same event tunneled through STP/0
    println!("\n3. STP/0 tunnel:");
    let mut event = TransportMessage::event(services::CONSOLE, commands::ON_CONSOLE_MESSAGE)
        .with_format(PayloadFormat::Json);
    event.set_message(&console)?;
    let legacy = frame::encode_stp0(&event)?;
    println!("  {}", frame::decode_utf16be(&legacy)?);

    let config = ReaderConfig::default().with_protocol_version(ProtocolVersion::Stp0);
    let mut reader = StpReader::with_config(Vec::new(), config);
    reader.on_data_ready(&legacy)?;
    let mut round_trip = ConsoleMessage::default();
    reader.handler()[0].parse_message(&mut round_trip)?;
    println!("  round trip intact: {}", round_trip == console);

    // Example 4: schema known only at runtime
    println!("\n4. Dynamic message:");
    let mut dynamic = DynamicMessage::new(ConsoleMessage::descriptor());
    json::decode(&mut dynamic, &event.payload.to_vec())?;
    println!("  {:?}", dynamic);

    Ok(())
}
