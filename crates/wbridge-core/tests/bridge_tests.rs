//! End-to-end tests: a parent and real worker threads exchanging envelopes.

use bytes::Bytes;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use wbridge_core::buffer::ReplyTag;
use wbridge_core::worker::WorkerContext;
use wbridge_core::{
    BlockingTransport, Codec, Completion, Delivery, FnReceiver, InProcessTransport,
    ManagedReceiver, MessageKind, OutgoingCall, ResultRecord, SyncService, ThreadSpawner,
    WorkerParent, WorkerScope,
};

const SETTINGS: &[u8] = br#"{"WorkerScriptPath":"_content/WebResource/WorkerScript.js","MessageReceiverFullName":"App.Receiver","BasePath":"https://localhost/"}"#;
const INIT: &[u8] = br#"{"BasePath":"https://localhost/","FrameworkDirName":"_framework","MessageHandlerMethodFullName":"App.Handler"}"#;

/// Worker receiver that answers every call with its argument bytes reversed.
fn reversing_receiver() -> Box<dyn ManagedReceiver> {
    Box::new(FnReceiver::new(7, |delivery: Delivery, codec: &mut Codec| {
        if delivery.kind != MessageKind::SCall {
            return Ok(Completion::Pending);
        }
        let call = codec.decode_incoming_call()?;
        let reversed: Vec<u8> = call.args.iter().rev().copied().collect();
        codec.encode_reply(ReplyTag::new(0, 0), &reversed)?;
        Ok(Completion::Result)
    }))
}

async fn next_inbound(
    inbound: &mut tokio::sync::mpsc::UnboundedReceiver<wbridge_core::Inbound>,
) -> wbridge_core::Inbound {
    tokio::time::timeout(Duration::from_secs(10), inbound.recv())
        .await
        .expect("worker did not answer in time")
        .expect("inbound channel closed")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parent_calls_worker_and_receives_result() {
    let (spawner, mut inbound) = ThreadSpawner::new(|context: WorkerContext| {
        let mut scope =
            WorkerScope::bootstrap(&context.init, context.port, reversing_receiver(), None)
                .unwrap();
        scope.run().unwrap();
    });

    let landed: Arc<Mutex<Vec<(MessageKind, u32, Option<ResultRecord>)>>> =
        Arc::new(Mutex::new(Vec::new()));
    let log = landed.clone();
    let receiver = FnReceiver::new(0, move |delivery: Delivery, codec: &mut Codec| {
        let record = match delivery.kind {
            MessageKind::Res => Some(codec.read_result()?),
            _ => None,
        };
        log.lock().unwrap().push((delivery.kind, delivery.source, record));
        Ok(Completion::Pending)
    });

    let mut parent = WorkerParent::configure(SETTINGS, Some(64), Box::new(receiver), spawner).unwrap();
    parent.create_worker(3, INIT).unwrap();

    let init = next_inbound(&mut inbound).await;
    assert_eq!(init.source, 3);
    parent.handle_worker_message(init).unwrap();

    // Large enough to force the worker's data region to grow.
    let args: Vec<u8> = (0..5000u32).map(|i| (i % 200) as u8).collect();
    parent
        .endpoint_mut()
        .codec_mut()
        .encode_outgoing_call(&OutgoingCall::new(&b"Reverse"[..], args.clone()))
        .unwrap();
    parent.scall(3).unwrap();

    let res = next_inbound(&mut inbound).await;
    assert_eq!(res.message.tag, "Res");
    parent.handle_worker_message(res).unwrap();

    let landed = landed.lock().unwrap();
    assert_eq!(landed.len(), 2);
    assert_eq!((landed[0].0, landed[0].1), (MessageKind::Init, 3));
    let record = landed[1].2.as_ref().unwrap();
    let expected: Vec<u8> = args.iter().rev().copied().collect();
    assert_eq!(&record.payload[..], &expected[..]);
    drop(landed);

    parent.terminate_worker(3).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_blocks_on_synchronous_call() {
    let service = Arc::new(SyncService::new());
    let transport: Arc<dyn BlockingTransport> = Arc::new(InProcessTransport::new(
        service.clone(),
        tokio::runtime::Handle::current(),
    ));

    let (result_tx, result_rx) = mpsc::channel::<ResultRecord>();
    let result_tx = Mutex::new(result_tx);
    let worker_transport = transport.clone();
    let (spawner, mut inbound) = ThreadSpawner::new(move |context: WorkerContext| {
        let mut scope =
            WorkerScope::bootstrap(&context.init, context.port, reversing_receiver(), None)
                .unwrap()
                .with_sync_transport(worker_transport.clone());

        let id = scope.assign_sync_call_source_id().unwrap();
        let call = OutgoingCall::new(&b"Add"[..], &b"[2,3]"[..])
            .with_header(Bytes::copy_from_slice(&id.to_le_bytes()));
        scope.endpoint_mut().codec_mut().encode_outgoing_call(&call).unwrap();
        scope.scall(0).unwrap();

        // Blocks this thread until the parent's reply reaches the responder.
        scope.wait_sync_call(id).unwrap();
        let record = scope.endpoint().codec().read_result().unwrap();
        result_tx.lock().unwrap().send(record).unwrap();
        scope.run().unwrap();
    });

    // Parent receiver: the call header carries the caller's source id.
    let receiver = FnReceiver::new(0, |delivery: Delivery, codec: &mut Codec| {
        if delivery.kind != MessageKind::SCall {
            return Ok(Completion::Pending);
        }
        let call = codec.decode_incoming_call()?;
        let mut id = [0u8; 4];
        id.copy_from_slice(&call.method[..4]);
        assert_eq!(&call.method[4..], b"Add");
        let args: Vec<i64> = wbridge_core::text::decode_json(&call.args)?;
        let sum = args.iter().sum::<i64>().to_string();
        codec.encode_reply(ReplyTag::new(i32::from_le_bytes(id), 0), sum.as_bytes())?;
        Ok(Completion::SyncResult)
    });

    let mut parent = WorkerParent::configure(SETTINGS, None, Box::new(receiver), spawner)
        .unwrap()
        .with_sync_transport(transport);
    parent.create_worker(0, INIT).unwrap();

    for _ in 0..2 {
        let message = next_inbound(&mut inbound).await;
        parent.handle_worker_message(message).unwrap();
    }

    let record = tokio::task::spawn_blocking(move || result_rx.recv_timeout(Duration::from_secs(10)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.tag.source_id, 1);
    assert_eq!(&record.payload[..], b"5");
    assert!(service.store().is_empty());

    parent.terminate_worker(0).unwrap();
}
