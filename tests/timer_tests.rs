//! Scheduled messages, driven on a paused clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use treestate::{Message, NodeDescriptor, StateBehavior, TreeStateMachine};

struct Tick;
struct Pause;
struct Play;
struct Timeout;

fn player(ticks: Arc<AtomicUsize>) -> NodeDescriptor {
    let playing = StateBehavior::new()
        .on_enter(|ctx| {
            ctx.schedule_periodic(|| Message::new(Tick), Duration::from_secs(1));
            Ok(())
        })
        .on_message(move |ctx| {
            if ctx.message_as::<Tick>().is_some() {
                ticks.fetch_add(1, Ordering::SeqCst);
                return Ok(ctx.stay());
            }
            if ctx.message_as::<Pause>().is_some() {
                return Ok(ctx.go_to("paused"));
            }
            Ok(ctx.unhandled())
        });
    let paused = StateBehavior::new().on_message(|ctx| {
        Ok(match ctx.message_as::<Play>() {
            Some(_) => ctx.go_to("playing"),
            None => ctx.unhandled(),
        })
    });

    NodeDescriptor::root("player")
        .initial("playing")
        .child(NodeDescriptor::leaf("playing").behavior(playing))
        .child(NodeDescriptor::leaf("paused").behavior(paused))
}

#[tokio::test(start_paused = true)]
async fn periodic_timer_ticks_while_state_is_active() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let machine = TreeStateMachine::new(player(Arc::clone(&ticks))).unwrap();
    machine.start().await.unwrap();

    sleep(Duration::from_millis(3500)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn exiting_a_state_cancels_its_timers() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let machine = TreeStateMachine::new(player(Arc::clone(&ticks))).unwrap();
    let current = machine.start().await.unwrap();

    sleep(Duration::from_millis(2500)).await;
    current.post(Pause).await.unwrap();
    let before = ticks.load(Ordering::SeqCst);
    assert_eq!(before, 2);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), before);
    assert_eq!(current.key(), "paused");

    current.post(Play).await.unwrap();
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), before + 1);
}

#[tokio::test(start_paused = true)]
async fn tick_due_at_the_moment_of_exit_is_never_observed() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let machine = TreeStateMachine::new(player(Arc::clone(&ticks))).unwrap();
    let current = machine.start().await.unwrap();

    sleep(Duration::from_secs(1)).await;
    current.post(Pause).await.unwrap();
    let at_pause = ticks.load(Ordering::SeqCst);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), at_pause);
}

#[tokio::test(start_paused = true)]
async fn one_shot_timer_fires_once() {
    let root = NodeDescriptor::root("door")
        .initial("open")
        .child(NodeDescriptor::leaf("open").behavior(
            StateBehavior::new()
                .on_enter(|ctx| {
                    ctx.schedule(|| Message::new(Timeout), Duration::from_secs(30));
                    Ok(())
                })
                .on_message(|ctx| {
                    Ok(match ctx.message_as::<Timeout>() {
                        Some(_) => ctx.go_to("closed"),
                        None => ctx.unhandled(),
                    })
                }),
        ))
        .child(NodeDescriptor::leaf("closed"));

    let machine = TreeStateMachine::new(root).unwrap();
    let mut transitions = machine.transitions();
    let current = machine.start().await.unwrap();
    transitions.recv().await.unwrap();

    sleep(Duration::from_secs(29)).await;
    assert_eq!(current.key(), "open");

    let record = transitions.recv().await.unwrap();
    assert_eq!(record.to, "closed");
    assert_eq!(machine.history().transitions().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancelled_handle_suppresses_delivery() {
    struct Arm;
    struct Disarm;

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let handle = Arc::new(parking_lot::Mutex::new(None));
    let slot = Arc::clone(&handle);

    let root = NodeDescriptor::root("alarm").initial("idle").child(
        NodeDescriptor::leaf("idle").behavior(StateBehavior::new().on_message(move |ctx| {
            if ctx.message_as::<Arm>().is_some() {
                let timer = ctx.schedule(|| Message::new(Timeout), Duration::from_secs(5));
                *slot.lock() = Some(timer);
                return Ok(ctx.stay());
            }
            if ctx.message_as::<Disarm>().is_some() {
                if let Some(timer) = slot.lock().take() {
                    timer.cancel();
                }
                return Ok(ctx.stay());
            }
            if ctx.message_as::<Timeout>().is_some() {
                counter.fetch_add(1, Ordering::SeqCst);
                return Ok(ctx.stay());
            }
            Ok(ctx.unhandled())
        })),
    );

    let machine = TreeStateMachine::new(root).unwrap();
    machine.start().await.unwrap();
    machine.post(Arm).await.unwrap();
    sleep(Duration::from_secs(2)).await;
    machine.post(Disarm).await.unwrap();
    assert!(handle.lock().is_none());

    sleep(Duration::from_secs(10)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}
