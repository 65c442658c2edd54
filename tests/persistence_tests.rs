//! Saving and restoring machines.

use serde::{Deserialize, Serialize};
use treestate::{
    Checkpoint, DataStateKey, InitialData, MachineError, MachineStatus, NodeDescriptor,
    PersistenceError, SavedNode, StateBehavior, TreeStateMachine,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Wallet {
    credit: u32,
}

struct Coin(u32);
struct Select;

fn vending() -> NodeDescriptor {
    NodeDescriptor::root("vending")
        .json_data(InitialData::value(Wallet { credit: 0 }))
        .initial("idle")
        .child(NodeDescriptor::leaf("idle").behavior(StateBehavior::new().on_message(|ctx| {
            if let Some(Coin(amount)) = ctx.message_as::<Coin>() {
                let amount = *amount;
                ctx.data_of_type::<Wallet>()?.modify(|wallet| wallet.credit += amount)?;
                return Ok(ctx.stay());
            }
            Ok(match ctx.message_as::<Select>() {
                Some(_) => ctx.go_to("selecting"),
                None => ctx.unhandled(),
            })
        })))
        .child(
            NodeDescriptor::interior("selecting")
                .initial("browsing")
                .child(
                    NodeDescriptor::leaf("browsing")
                        .json_data(InitialData::from_ancestor_type(|wallet: &Wallet| wallet.credit * 2)),
                )
                .child(NodeDescriptor::leaf("dispensing")),
        )
}

async fn saved_vending() -> Checkpoint {
    let machine = TreeStateMachine::new(vending()).unwrap();
    let current = machine.start().await.unwrap();
    current.post(Coin(25)).await.unwrap();
    current.post(Coin(10)).await.unwrap();
    current.post(Select).await.unwrap();
    machine.save().await.unwrap()
}

#[tokio::test]
async fn save_records_the_active_path_root_first() {
    let checkpoint = saved_vending().await;
    let keys: Vec<_> = checkpoint.nodes.iter().map(|node| node.key.as_str()).collect();
    assert_eq!(keys, vec!["vending", "selecting", "browsing"]);
    assert_eq!(checkpoint.data_of(&"vending".into()), Some(&serde_json::json!({ "credit": 35 })));
    assert_eq!(checkpoint.data_of(&"browsing".into()), Some(&serde_json::json!(70)));
    assert!(checkpoint.nodes[1].data.is_none());
}

#[tokio::test]
async fn load_restores_leaf_and_data() {
    let checkpoint = saved_vending().await;

    let restored = TreeStateMachine::new(vending()).unwrap();
    let current = restored.load(&checkpoint).await.unwrap();

    assert_eq!(current.key(), "browsing");
    assert_eq!(
        restored
            .data_value(&DataStateKey::<Wallet>::new("vending"))
            .unwrap()
            .value()
            .unwrap(),
        Wallet { credit: 35 }
    );
    assert_eq!(
        restored
            .data_value(&DataStateKey::<u32>::new("browsing"))
            .unwrap()
            .value()
            .unwrap(),
        70
    );

    let record = restored.history().last().cloned().unwrap();
    assert_eq!(record.from, None);
    assert_eq!(record.entered, vec!["vending", "selecting", "browsing"]);
}

#[tokio::test]
async fn checkpoints_survive_json_and_binary_encoding() {
    let checkpoint = saved_vending().await;

    let from_json = Checkpoint::from_json(&checkpoint.to_json().unwrap()).unwrap();
    assert_eq!(from_json, checkpoint);

    let from_binary = Checkpoint::from_binary(&checkpoint.to_binary().unwrap()).unwrap();
    assert_eq!(from_binary, checkpoint);

    let machine = TreeStateMachine::new(vending()).unwrap();
    let current = machine.load(&from_binary).await.unwrap();
    assert_eq!(current.key(), "browsing");
}

async fn load_error(checkpoint: &Checkpoint) -> PersistenceError {
    let machine = TreeStateMachine::new(vending()).unwrap();
    let error = match machine.load(checkpoint).await {
        Err(MachineError::Persistence(error)) => error,
        other => panic!("expected a persistence error, got {other:?}"),
    };
    assert_eq!(machine.status(), MachineStatus::NotStarted);
    assert!(machine.start().await.is_ok());
    error
}

#[tokio::test]
async fn unknown_keys_are_rejected() {
    let mut checkpoint = saved_vending().await;
    checkpoint.nodes[2].key = "vanished".into();
    assert_eq!(
        load_error(&checkpoint).await,
        PersistenceError::UnknownKey {
            key: "vanished".into()
        }
    );
}

#[tokio::test]
async fn paths_must_be_contiguous_from_the_root() {
    let mut checkpoint = saved_vending().await;
    checkpoint.nodes.remove(1);
    assert_eq!(
        load_error(&checkpoint).await,
        PersistenceError::BrokenPath {
            parent: "vending".into(),
            child: "browsing".into()
        }
    );

    let mut checkpoint = saved_vending().await;
    checkpoint.nodes.remove(0);
    assert!(matches!(
        load_error(&checkpoint).await,
        PersistenceError::NotRootFirst { .. }
    ));

    let mut checkpoint = saved_vending().await;
    checkpoint.nodes.pop();
    assert!(matches!(
        load_error(&checkpoint).await,
        PersistenceError::EndsAtComposite { .. }
    ));
}

#[tokio::test]
async fn data_must_decode() {
    let mut checkpoint = saved_vending().await;
    checkpoint.nodes[0].data = Some(serde_json::json!({ "credit": "lots" }));
    assert!(matches!(
        load_error(&checkpoint).await,
        PersistenceError::DecodeFailed { .. }
    ));

    let mut checkpoint = saved_vending().await;
    checkpoint.nodes[0].data = None;
    assert!(matches!(
        load_error(&checkpoint).await,
        PersistenceError::MissingData { .. }
    ));

    let mut checkpoint = saved_vending().await;
    checkpoint.nodes[1] = SavedNode {
        key: "selecting".into(),
        data: Some(serde_json::json!(1)),
    };
    assert!(matches!(
        load_error(&checkpoint).await,
        PersistenceError::UnexpectedData { .. }
    ));
}

#[tokio::test]
async fn unsupported_versions_and_empty_checkpoints_are_rejected() {
    let mut checkpoint = saved_vending().await;
    checkpoint.version = 99;
    assert!(matches!(
        load_error(&checkpoint).await,
        PersistenceError::UnsupportedVersion { found: 99, .. }
    ));

    checkpoint.version = treestate::checkpoint::CHECKPOINT_VERSION;
    checkpoint.nodes.clear();
    assert_eq!(load_error(&checkpoint).await, PersistenceError::EmptyCheckpoint);
}

#[tokio::test]
async fn data_without_codec_cannot_be_saved() {
    let root = NodeDescriptor::root("root")
        .data(InitialData::value(1u8))
        .initial("leaf")
        .child(NodeDescriptor::leaf("leaf"));

    let machine = TreeStateMachine::new(root).unwrap();
    assert_eq!(machine.save().await.unwrap_err(), PersistenceError::NotStarted);

    machine.start().await.unwrap();
    assert!(matches!(
        machine.save().await,
        Err(PersistenceError::MissingCodec { .. })
    ));
}

#[tokio::test]
async fn loading_a_started_machine_is_rejected() {
    let checkpoint = saved_vending().await;
    let machine = TreeStateMachine::new(vending()).unwrap();
    machine.start().await.unwrap();
    assert!(matches!(
        machine.load(&checkpoint).await,
        Err(MachineError::AlreadyStarted)
    ));
}
