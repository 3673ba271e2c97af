//! Basic medialoop example
//!
//! Runs the reactor with a repeating tick timer, posts application
//! messages, and demonstrates a nested loop blocking on a one-shot job.
//!
//! # Environment Variables
//!
//! - `MLOOP_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `MLOOP_FLUSH_LOG=1` - Flush debug output immediately

use std::time::Duration;

use medialoop::{
    minfo, MainLoop, Message, MessageBody, MessageKind, OwnerTag, ReactorConfig, TimerMode,
};

const KIND_TICK: MessageKind = MessageKind(1);
const KIND_QUIT: MessageKind = MessageKind(2);

// MLOOP_LOG_LEVEL=debug cargo run -p medialoop-basic
fn main() {
    println!("=== medialoop basic example ===\n");

    let config = ReactorConfig::from_env();
    let lp = MainLoop::new(config).expect("reactor setup failed");
    let owner = OwnerTag::next();

    // Tick every 100ms; turn each tick into an application message.
    lp.timers().add(
        Duration::from_millis(100),
        Duration::from_millis(100),
        TimerMode::Repeated,
        owner,
        "basic-tick",
        |ml| {
            ml.post_message(Message::index(KIND_TICK, 0));
        },
    );

    // Stop after one second.
    lp.timers().add(
        Duration::from_secs(1),
        Duration::ZERO,
        TimerMode::Single,
        owner,
        "basic-quit",
        |ml| {
            ml.post_message(Message::index(KIND_QUIT, 0));
        },
    );

    let lp2 = lp.clone();
    lp.enter(&move |msg: &Message| match msg.kind {
        KIND_TICK => {
            if let MessageBody::Index(_) = msg.body {
                println!("tick ({} ms)", msg.when_ms);
            }
        }
        KIND_QUIT => {
            minfo!("quit message received");

            // A synchronous "wait for this job" call: run a nested loop
            // until its own timer exits it, then continue here.
            lp2.timers().add(
                Duration::from_millis(200),
                Duration::ZERO,
                TimerMode::Single,
                OwnerTag::next(),
                "basic-nested-done",
                |ml| {
                    println!("nested job finished");
                    ml.exit();
                },
            );
            println!("entering nested loop...");
            lp2.enter(&|_: &Message| {});
            println!("back from nested loop");

            let cancelled = lp2.timers().cancel_owner(owner);
            minfo!("cancelled {} remaining timer(s)", cancelled);
            lp2.exit();
        }
        _ => {}
    });

    let leaked = lp.timers().has_listener(owner);
    println!("\nloop finished (timers leaked: {})", leaked);
}
