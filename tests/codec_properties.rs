//! Property tests: every payload format reproduces what it encoded

use std::fmt::Debug;
use std::sync::OnceLock;

use proptest::collection::vec;
use proptest::option;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use scope_stp::messages::{ConsoleMessage, Severity, WindowInfo, WindowList};
use scope_stp::*;

fn formats() -> Vec<PayloadFormat> {
    let mut formats = vec![PayloadFormat::Binary, PayloadFormat::Json];
    if cfg!(feature = "xml") {
        formats.push(PayloadFormat::Xml);
    }
    formats
}

/// Printable text including the characters markup has to escape
fn arb_text() -> impl Strategy<Value = String> {
    "[ -~\u{e9}\u{4e2d}\u{1F600}]{0,24}"
}

/// Floats every format writes and reads back exactly
fn arb_f64() -> impl Strategy<Value = f64> {
    any::<i32>().prop_map(|v| f64::from(v) / 64.0)
}

fn arb_f32() -> impl Strategy<Value = f32> {
    any::<i16>().prop_map(|v| f32::from(v) / 8.0)
}

fn arb_severity() -> impl Strategy<Value = Severity> {
    prop_oneof![
        Just(Severity::Debug),
        Just(Severity::Information),
        Just(Severity::Warning),
        Just(Severity::Error),
    ]
}

fn arb_console() -> impl Strategy<Value = ConsoleMessage> {
    (
        any::<u32>(),
        any::<u64>(),
        arb_text(),
        option::of(arb_text()),
        option::of(any::<u32>()),
        option::of(arb_severity()),
        option::of(arb_text()),
    )
        .prop_map(|(window_id, time, description, uri, line, severity, context)| {
            let mut console = ConsoleMessage::new(window_id, time, description);
            if let Some(uri) = uri {
                console.set_uri(uri);
            }
            if let Some(line) = line {
                console.set_line(line);
            }
            if let Some(severity) = severity {
                console.set_severity(severity);
            }
            if let Some(context) = context {
                console.set_context(context);
            }
            console
        })
}

fn arb_window() -> impl Strategy<Value = WindowInfo> {
    (any::<u32>(), arb_text(), option::of(any::<u32>())).prop_map(|(id, title, opener)| {
        let mut window = WindowInfo::new(id, title);
        if let Some(opener) = opener {
            window.set_opener_id(opener);
        }
        window
    })
}

fn arb_window_list() -> impl Strategy<Value = WindowList> {
    (vec(arb_window(), 0..5), option::of(arb_window())).prop_map(|(windows, active)| {
        let mut list = WindowList::default();
        list.windows = windows;
        if let Some(active) = active {
            list.set_active(active);
        }
        list
    })
}

fn scalars_descriptor() -> &'static MessageDescriptor {
    static DESCRIPTOR: OnceLock<MessageDescriptor> = OnceLock::new();
    DESCRIPTOR.get_or_init(|| {
        MessageDescriptor::new(
            "Scalars",
            vec![
                FieldDescriptor::required("delta", 1, FieldKind::Sint32),
                FieldDescriptor::required("offset", 2, FieldKind::Sint64),
                FieldDescriptor::required("hash", 3, FieldKind::Fixed32),
                FieldDescriptor::required("id", 4, FieldKind::Fixed64),
                FieldDescriptor::required("stamp", 5, FieldKind::Sfixed64),
                FieldDescriptor::required("ratio", 6, FieldKind::Float),
                FieldDescriptor::required("total", 7, FieldKind::Double),
                FieldDescriptor::required("enabled", 8, FieldKind::Bool),
                FieldDescriptor::optional("blob", 9, FieldKind::Bytes),
                FieldDescriptor::optional("label", 10, FieldKind::String),
                FieldDescriptor::repeated("steps", 11, FieldKind::Sint32),
            ],
        )
    })
}

#[derive(Debug, Clone)]
struct Scalars {
    delta: i32,
    offset: i64,
    hash: u32,
    id: u64,
    stamp: i64,
    ratio: f32,
    total: f64,
    enabled: bool,
    blob: Option<Vec<u8>>,
    label: Option<String>,
    steps: Vec<i32>,
}

fn arb_scalars() -> impl Strategy<Value = Scalars> {
    (
        (any::<i32>(), any::<i64>(), any::<u32>(), any::<u64>(), any::<i64>()),
        (arb_f32(), arb_f64(), any::<bool>()),
        (
            option::of(vec(any::<u8>(), 0..32)),
            option::of(arb_text()),
            vec(any::<i32>(), 0..6),
        ),
    )
        .prop_map(
            |((delta, offset, hash, id, stamp), (ratio, total, enabled), (blob, label, steps))| {
                Scalars {
                    delta,
                    offset,
                    hash,
                    id,
                    stamp,
                    ratio,
                    total,
                    enabled,
                    blob,
                    label,
                    steps,
                }
            },
        )
}

fn build_scalars(values: &Scalars) -> DynamicMessage {
    let mut msg = DynamicMessage::new(scalars_descriptor());
    let mut proxy = MessageMut::new(&mut msg);
    proxy.set_i32(0, values.delta).unwrap();
    proxy.set_i64(1, values.offset).unwrap();
    proxy.set_u32(2, values.hash).unwrap();
    proxy.set_u64(3, values.id).unwrap();
    proxy.set_i64(4, values.stamp).unwrap();
    proxy.set_f32(5, values.ratio).unwrap();
    proxy.set_f64(6, values.total).unwrap();
    proxy.set_bool(7, values.enabled).unwrap();
    if let Some(blob) = &values.blob {
        proxy.set_bytes(8, blob).unwrap();
    }
    if let Some(label) = &values.label {
        proxy.set_str(9, label).unwrap();
    }
    let steps = proxy.repeated_mut(10).unwrap();
    for step in &values.steps {
        if let FieldMut::I32(slot) = steps.push_default() {
            *slot = *step;
        }
    }
    msg
}

/// Encode `message` in every format and decode it into a fresh instance
fn check_formats<M>(message: &M, fresh: impl Fn() -> M) -> std::result::Result<(), TestCaseError>
where
    M: Message + PartialEq + Debug,
{
    for format in formats() {
        let bytes = codec::encode(message, format).unwrap();
        let mut decoded = fresh();
        codec::decode(&mut decoded, format, &bytes).unwrap();
        prop_assert_eq!(&decoded, message, "format {}", format.name());
    }
    Ok(())
}

proptest! {
    #[test]
    fn console_round_trips_in_every_format(console in arb_console()) {
        check_formats(&console, ConsoleMessage::default)?;
    }

    #[test]
    fn window_list_round_trips_in_every_format(list in arb_window_list()) {
        check_formats(&list, WindowList::default)?;
    }

    #[test]
    fn dynamic_scalars_round_trip_in_every_format(values in arb_scalars()) {
        let msg = build_scalars(&values);
        check_formats(&msg, || DynamicMessage::new(scalars_descriptor()))?;

        let view = MessageRef::new(&msg);
        prop_assert_eq!(view.is_present(8).unwrap(), values.blob.is_some());
        prop_assert_eq!(view.get_f32(5).unwrap(), values.ratio);
    }

    #[test]
    fn binary_size_matches_encoding(list in arb_window_list()) {
        let wire = codec::binary::encode(&list).unwrap();
        prop_assert_eq!(codec::binary::encoded_len(&list).unwrap(), wire.len());
    }
}
