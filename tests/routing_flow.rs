mod common;

use common::{MockDriver, inbound};
use hearsay::cache::InMemoryCache;
use hearsay::config::Config;
use hearsay::dispatch::Dispatcher;
use hearsay::message::IncomingMessage;
use hearsay::router::GroupAttributes;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn dispatcher(driver: Arc<MockDriver>) -> Dispatcher {
    Dispatcher::new(driver, Arc::new(InMemoryCache::default()), Config::default())
}

#[tokio::test]
async fn test_hears_matches_exactly_once() {
    let driver = MockDriver::new("telegram");
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in = Arc::clone(&calls);

    let mut bot = dispatcher(Arc::clone(&driver));
    bot.router_mut().hears("foo", move |_ctx, _caps| {
        let c = Arc::clone(&calls_in);
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    driver.push(inbound("foo"));
    bot.listen().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    driver.push(inbound("bar"));
    bot.listen().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_placeholders_bind_named_parameters() {
    let driver = MockDriver::new("telegram");
    let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_in = Arc::clone(&seen);

    let mut bot = dispatcher(Arc::clone(&driver));
    bot.router_mut()
        .hears("I am {name} the {attribute}", move |_ctx, caps| {
            let seen = Arc::clone(&seen_in);
            async move {
                seen.lock().unwrap().push((
                    caps.get("name").unwrap_or_default().to_string(),
                    caps.get("attribute").unwrap_or_default().to_string(),
                ));
                Ok(())
            }
        });

    driver.push(inbound("I am Gandalf the grey"));
    bot.listen().await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        seen.as_slice(),
        [("Gandalf".to_string(), "grey".to_string())]
    );
}

#[tokio::test]
async fn test_matching_is_case_insensitive() {
    let driver = MockDriver::new("telegram");
    let name: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let name_in = Arc::clone(&name);

    let mut bot = dispatcher(Arc::clone(&driver));
    bot.router_mut().hears("hi {name}", move |_ctx, caps| {
        let name = Arc::clone(&name_in);
        async move {
            *name.lock().unwrap() = caps.get("name").map(str::to_string);
            Ok(())
        }
    });

    driver.push(inbound("Hi Julia"));
    bot.listen().await.unwrap();
    assert_eq!(name.lock().unwrap().as_deref(), Some("Julia"));
}

#[tokio::test]
async fn test_group_constraint_ends_with_block() {
    let driver = MockDriver::new("telegram");
    let grouped = Arc::new(AtomicUsize::new(0));
    let plain = Arc::new(AtomicUsize::new(0));
    let grouped_in = Arc::clone(&grouped);
    let plain_in = Arc::clone(&plain);

    let mut bot = dispatcher(Arc::clone(&driver));
    bot.router_mut().group(
        GroupAttributes::default().for_drivers(["slack"]),
        move |router| {
            let grouped_in = Arc::clone(&grouped_in);
            router.hears("ping", move |_ctx, _caps| {
                let c = Arc::clone(&grouped_in);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        },
    );
    // Registered after the block: unconstrained again
    bot.router_mut().hears("ping", move |_ctx, _caps| {
        let c = Arc::clone(&plain_in);
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    driver.push(inbound("ping"));
    bot.listen().await.unwrap();

    // Active driver is telegram: the slack-scoped command stays silent and
    // the unconstrained one fires.
    assert_eq!(grouped.load(Ordering::SeqCst), 0);
    assert_eq!(plain.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fallback_conditions() {
    let driver = MockDriver::new("telegram");
    let fallbacks = Arc::new(AtomicUsize::new(0));
    let fallbacks_in = Arc::clone(&fallbacks);

    let mut bot = dispatcher(Arc::clone(&driver));
    bot.router_mut().hears("known", |ctx, _caps| async move {
        ctx.say("ack").await?;
        Ok(())
    });
    bot.router_mut().fallback(move |ctx, _caps| {
        let c = Arc::clone(&fallbacks_in);
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            ctx.say("I did not get that").await?;
            Ok(())
        }
    });

    // No command matched: fallback fires once
    driver.push(inbound("unknown"));
    bot.listen().await.unwrap();
    assert_eq!(fallbacks.load(Ordering::SeqCst), 1);

    // A command matched: no fallback
    driver.push(inbound("known"));
    bot.listen().await.unwrap();
    assert_eq!(fallbacks.load(Ordering::SeqCst), 1);

    // Bot-originated message: neither command nor fallback
    driver.push(inbound("unknown").from_bot());
    bot.listen().await.unwrap();
    assert_eq!(fallbacks.load(Ordering::SeqCst), 1);
    assert_eq!(driver.sent_texts(), ["I did not get that", "ack"]);
}

#[tokio::test]
async fn test_bot_delivery_is_inert() {
    let driver = MockDriver::bot("telegram");
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in = Arc::clone(&calls);

    let mut bot = dispatcher(Arc::clone(&driver));
    bot.router_mut().hears("foo", move |_ctx, _caps| {
        let c = Arc::clone(&calls_in);
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    bot.router_mut().fallback(move |_ctx, _caps| async move {
        panic!("fallback must not fire for bot deliveries");
    });

    driver.push(inbound("foo"));
    let outcome = bot.listen().await.unwrap();
    assert_eq!(outcome.heard, 0);
    assert!(!outcome.fallback);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_interactive_payload_matched_via_answer_value() {
    let driver = MockDriver::new("telegram");
    let picked: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let picked_in = Arc::clone(&picked);

    let mut bot = dispatcher(Arc::clone(&driver));
    bot.router_mut().hears("choice_{id}", move |_ctx, caps| {
        let picked = Arc::clone(&picked_in);
        async move {
            *picked.lock().unwrap() = caps.get("id").map(str::to_string);
            Ok(())
        }
    });

    // Button tap: no message text, payload in the callback extra
    let mut message = IncomingMessage::new("telegram", "user1", "chat1", "");
    message.extras.insert("callback".into(), json!("choice_42"));
    driver.push(message);

    bot.listen().await.unwrap();
    assert_eq!(picked.lock().unwrap().as_deref(), Some("42"));
}

#[tokio::test]
async fn test_each_message_in_batch_routed_independently() {
    let driver = MockDriver::new("telegram");
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in = Arc::clone(&calls);

    let mut bot = dispatcher(Arc::clone(&driver));
    bot.router_mut().hears("ping", move |_ctx, _caps| {
        let c = Arc::clone(&calls_in);
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    driver.push(inbound("ping"));
    driver.push(inbound("ping"));
    driver.push(inbound("nope"));
    let outcome = bot.listen().await.unwrap();

    assert_eq!(outcome.messages, 3);
    assert_eq!(outcome.heard, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
