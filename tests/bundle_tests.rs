use bp7sec::bundle::{new_canonical_block, new_payload_block, SecBundle, PAYLOAD_BLOCK_NUMBER};
use bp7sec::dtntime::CreationTimestamp;
use bp7sec::eid::EndpointID;
use bp7sec::primary::PrimaryBlockBuilder;
use std::time::Duration;

fn sample_bundle() -> SecBundle {
    let dst = EndpointID::with_dtn("node2/inbox").unwrap();
    let src = EndpointID::with_dtn("node1/123456").unwrap();
    let primary = PrimaryBlockBuilder::new()
        .destination(dst)
        .source(src.clone())
        .report_to(src)
        .creation_timestamp(CreationTimestamp::with_time_and_seq(0, 0))
        .lifetime(Duration::from_secs(3600))
        .build();
    SecBundle::new(
        primary,
        vec![
            new_payload_block(0, b"ABC".to_vec()),
            new_canonical_block(7, 2, 0, vec![0x00]),
        ],
    )
}

#[test]
fn wire_roundtrip_preserves_the_bundle() {
    let bundle = sample_bundle();
    let wire = bundle.to_cbor().unwrap();
    // indefinite-length array framing
    assert_eq!(wire[0], 0x9f);
    assert_eq!(*wire.last().unwrap(), 0xff);

    let parsed = SecBundle::from_cbor(&wire).unwrap();
    assert_eq!(parsed, bundle);
    assert_eq!(parsed.to_cbor().unwrap(), wire);
}

#[test]
fn block_accessors() {
    let mut bundle = sample_bundle();

    assert_eq!(bundle.block_data(1).unwrap(), b"ABC");
    assert!(bundle.block_data(9).is_err());
    assert_eq!(bundle.block_head(2).unwrap().block_type, 7);
    assert!(bundle.block_head(0).is_none());
    assert_eq!(bundle.next_block_number(), 3);

    bundle.set_block_data(2, vec![0x01, 0x02]).unwrap();
    assert_eq!(bundle.block_data(2).unwrap(), &[0x01, 0x02]);

    // the data field wire form is a CBOR byte string
    assert_eq!(bundle.block_data_wire(2).unwrap(), vec![0x42, 0x01, 0x02]);
}

#[test]
fn payload_stream_handoff() {
    let mut bundle = sample_bundle();
    let payload = bundle.take_payload().unwrap();
    assert_eq!(payload.len(), 3);
    // the bundle keeps an empty payload until the object is handed back
    assert!(bundle.block_data(PAYLOAD_BLOCK_NUMBER).unwrap().is_empty());

    bundle.replace_payload(payload).unwrap();
    assert_eq!(bundle.block_data(PAYLOAD_BLOCK_NUMBER).unwrap(), b"ABC");
}

#[test]
fn eid_display_forms() {
    assert_eq!(
        EndpointID::with_ipn(23, 42).unwrap().to_string(),
        "ipn:23.42"
    );
    assert_eq!(
        EndpointID::with_dtn("node1/inbox").unwrap().to_string(),
        "dtn://node1/inbox"
    );
    assert_eq!(EndpointID::none().to_string(), "dtn:none");
    assert!(EndpointID::with_ipn(0, 1).is_err());
}
