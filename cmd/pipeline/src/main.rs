//! Pipeline medialoop example
//!
//! Simulates a decode pipeline: a producer thread "decodes" fixed-size
//! frames into a `FrameQueue` while a consumer thread drains them with a
//! bounded wait; the producer notifies the reactor thread through a
//! `ThreadChannel` each time a frame is ready, and the reactor turns the
//! notifications into application messages.

use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use medialoop::{
    minfo, FrameQueue, MainLoop, Message, MessageBody, MessageKind, ReactorConfig, ThreadChannel,
};

const KIND_FRAME: MessageKind = MessageKind(10);
const FRAME_BYTES: usize = 64;
const FRAMES: usize = 20;

fn main() {
    println!("=== medialoop pipeline example ===\n");

    let lp = MainLoop::new(ReactorConfig::from_env()).expect("reactor setup failed");
    let frames = Arc::new(FrameQueue::new(4, FRAME_BYTES));

    // Reactor-side: channel wakeups become application messages.
    let lp2 = lp.clone();
    let (_channel, post) = ThreadChannel::create(Rc::clone(lp.registry()), "decoder", move |rx| {
        let mut buf = [0u8; 8];
        if let Ok(8) = rx.get(&mut buf) {
            let seq = u64::from_le_bytes(buf);
            lp2.post_message(Message::index(KIND_FRAME, seq as i32));
        }
    })
    .expect("channel setup failed");

    // Producer: decode frames, hand them to the consumer stage, notify
    // the reactor.
    let producer = {
        let frames = Arc::clone(&frames);
        thread::spawn(move || {
            for seq in 0u64..FRAMES as u64 {
                let mut frame = [0u8; FRAME_BYTES];
                frame[..8].copy_from_slice(&seq.to_le_bytes());
                // Non-blocking put: drop-and-retry when the stage is behind.
                while !frames.put(&frame) {
                    thread::sleep(Duration::from_millis(1));
                }
                post.post(&seq.to_le_bytes()).expect("notify failed");
                thread::sleep(Duration::from_millis(5));
            }
        })
    };

    // Consumer stage: bounded blocking gets on its own thread.
    let consumer = {
        let frames = Arc::clone(&frames);
        thread::spawn(move || {
            let mut out = [0u8; FRAME_BYTES];
            let mut received = 0usize;
            while received < FRAMES {
                if frames.get_wait(&mut out, Duration::from_secs(2)) {
                    received += 1;
                } else {
                    println!("consumer: timed out waiting for a frame");
                    break;
                }
            }
            received
        })
    };

    // Reactor: count frame notifications, leave after the last one.
    let lp3 = lp.clone();
    lp.enter(&move |msg: &Message| {
        if msg.kind == KIND_FRAME {
            if let MessageBody::Index(seq) = msg.body {
                println!("frame {} decoded", seq);
                if seq as usize == FRAMES - 1 {
                    lp3.exit();
                }
            }
        }
    });

    producer.join().unwrap();
    let received = consumer.join().unwrap();
    let stats = frames.stats();
    minfo!("queue stats: {:?}", stats);
    println!("\nconsumer received {}/{} frames", received, FRAMES);
}
