/*!
# Synthetic HL7 v2 message generation and delivery over MLLP.

 HL7's MLLP is a simple, single-byte-text based protocol for framing HL7 messages over a TCP (or similar) transport:
 each message is wrapped as `<VT> message <FS><CR>`.
 The full specification is available at [the HL7 site](https://www.hl7.org/documentcenter/private/standards/v3/V3_TRMLLP_R2_R2019.zip) (Note that they place the standards behind a free membership/login form).

 This crate is a test harness for systems that receive HL7 over MLLP. It provides:
 - a [Codec](https://docs.rs/tokio-util/0.7/tokio_util/codec/index.html) implementation, [`MllpCodec`], that encodes/decodes MLLP frames from a Tokio stream
 - a [`Transport`] that sends one framed payload to many endpoints, reporting each endpoint's outcome on its own
 - [`Template`]s describing how to fill each field of a message, and a [`Session`] that turns them into [`Message`]s
 - a [`Runner`] that drives a whole [`Scenario`] (generate, send, pace, optionally re-send with updated fields)
 - a [`Listener`] which acknowledges everything it receives, useful as a local receiver

 NB. The transport opens a fresh connection per endpoint per message and reads a single reply. It is meant for
 functional testing, not throughput.

 ## Example

 ### Publisher
 ```no_run
use hl7_mllp_sender::{builtin, Endpoint, Session, Transport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let template = builtin::builtin("orm-o01")?;
    let mut session = Session::seeded(7);
    let message = session.generate(&template)?;

    // each endpoint gets its own connection; the payload is wrapped in the MLLP header/footer for us
    let transport = Transport::default();
    let targets = ["127.0.0.1:2575".parse::<Endpoint>()?, Endpoint::local(2576)];

    for result in transport.send(&message.render(), &targets).await? {
        match result.outcome {
            Ok(response) => println!("  Received response from {}: {}", result.endpoint, response.text()),
            Err(e) => println!("  ERROR from {}: {}", result.endpoint, e),
        }
    }

    Ok(())
}
```

 ### Listener
 ```no_run
use hl7_mllp_sender::Listener;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    Listener::bind("127.0.0.1:2575").await?.run().await
}
```
 */

pub mod builtin;
pub mod cli;
pub mod codec;
pub mod config;
pub mod dataset;
pub mod endpoint;
pub mod error;
pub mod fake;
pub mod listener;
pub mod message;
pub mod runner;
pub mod session;
pub mod template;
pub mod transport;

pub use codec::MllpCodec;
pub use config::{OutputFormat, Phase, Scenario, TransportSettings, UpdatePlan};
pub use dataset::Dataset;
pub use endpoint::Endpoint;
pub use error::{Error, Result, SendError, Stage};
pub use fake::FakeKind;
pub use listener::Listener;
pub use message::{FieldRef, Message, Segment};
pub use runner::{JsonMessage, RunSummary, Runner};
pub use session::Session;
pub use template::{SegmentTemplate, Template, ValueSource};
pub use transport::{DeliveryResult, Response, Transport, TransportConfig};
