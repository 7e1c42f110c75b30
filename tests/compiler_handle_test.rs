//! Tests for compiler handle construction, reply tracking, and teardown.

mod common;

use common::{init_logging, options, Kind, StubToolchain};
use paravirt_compiler::compiler::{CompilerHandle, CreateArgs, TARGET_INFO_SIZE};
use paravirt_compiler::core::{ConstructorAbi, CreateError};

const TARGET_INFO: [u8; TARGET_INFO_SIZE] = [0x01, 0x00, 0x0e, 0x00, 0x00, 0x00, 0x00, 0x00];

#[test]
fn test_create_legacy() {
    init_logging();
    let stub = StubToolchain::legacy();

    let compiler = CompilerHandle::create(&stub.providers(), CreateArgs::Legacy).unwrap();

    assert_eq!(compiler.constructor_abi(), ConstructorAbi::Legacy);
    assert_eq!(stub.calls("create_compiler"), 1);
    assert_eq!(stub.live(Kind::Compiler), 1);
    assert!(!compiler.has_outstanding_reply());
    assert!(compiler.last_error().is_none());
}

#[test]
fn test_create_versioned_passes_target_info() {
    init_logging();
    let stub = StubToolchain::versioned();

    let compiler =
        CompilerHandle::create(&stub.providers(), CreateArgs::Versioned(&TARGET_INFO)).unwrap();

    assert_eq!(compiler.constructor_abi(), ConstructorAbi::Versioned);
    assert_eq!(stub.target_infos(), vec![TARGET_INFO.to_vec()]);
    assert_eq!(stub.calls("create_compiler"), 0);
}

#[test]
fn test_short_target_info_never_reaches_provider() {
    init_logging();
    let stub = StubToolchain::versioned();

    let err = CompilerHandle::create(&stub.providers(), CreateArgs::Versioned(&TARGET_INFO[..4]))
        .unwrap_err();

    assert_eq!(
        err,
        CreateError::InvalidTargetInfoSize {
            expected: TARGET_INFO_SIZE,
            actual: 4
        }
    );
    assert_eq!(stub.total_calls(), 0);
    assert_eq!(stub.allocated(Kind::Compiler), 0);
}

#[test]
fn test_abi_mismatch_rejected() {
    init_logging();
    let legacy = StubToolchain::legacy();
    let err = CompilerHandle::create(&legacy.providers(), CreateArgs::Versioned(&TARGET_INFO))
        .unwrap_err();
    assert_eq!(
        err,
        CreateError::AbiMismatch {
            active: ConstructorAbi::Legacy,
            requested: ConstructorAbi::Versioned
        }
    );
    assert_eq!(legacy.total_calls(), 0);

    let versioned = StubToolchain::versioned();
    let err = CompilerHandle::create(&versioned.providers(), CreateArgs::Legacy).unwrap_err();
    assert!(matches!(err, CreateError::AbiMismatch { .. }));
    assert_eq!(versioned.total_calls(), 0);
}

#[test]
fn test_provider_rejection() {
    init_logging();
    let stub = StubToolchain::legacy();
    stub.reject_compiler();

    let err = CompilerHandle::create(&stub.providers(), CreateArgs::Legacy).unwrap_err();

    assert_eq!(err, CreateError::ProviderRejected);
    assert_eq!(stub.calls("destroy_compiler"), 0);
}

#[test]
fn test_drop_destroys_compiler_once() {
    init_logging();
    let stub = StubToolchain::legacy();

    let compiler = CompilerHandle::create(&stub.providers(), CreateArgs::Legacy).unwrap();
    drop(compiler);

    assert_eq!(stub.calls("destroy_compiler"), 1);
    assert_eq!(stub.live(Kind::Compiler), 0);
}

#[test]
fn test_release_without_build_is_noop() {
    init_logging();
    let stub = StubToolchain::legacy();
    let mut compiler = CompilerHandle::create(&stub.providers(), CreateArgs::Legacy).unwrap();

    compiler.release_reply();
    compiler.release_reply();

    assert_eq!(stub.calls("dispose_buffer"), 0);
    assert!(compiler.reply().is_none());
}

#[test]
fn test_release_twice_disposes_once() {
    init_logging();
    let stub = StubToolchain::legacy().with_functions(&["main0"]);
    let mut compiler = CompilerHandle::create(&stub.providers(), CreateArgs::Legacy).unwrap();

    compiler.build(&options(&["main0"]), 0, stub.module()).unwrap();
    compiler.release_reply();
    compiler.release_reply();

    assert_eq!(stub.calls("dispose_buffer"), 1);
    assert!(compiler.reply_bytes().is_none());
}

#[test]
fn test_second_build_releases_previous_reply() {
    init_logging();
    let stub = StubToolchain::legacy().with_functions(&["main0", "main1"]);
    let mut compiler = CompilerHandle::create(&stub.providers(), CreateArgs::Legacy).unwrap();

    compiler.build(&options(&["main0"]), 0, stub.module()).unwrap();
    let second = compiler.build(&options(&["main1"]), 0, stub.module()).unwrap();

    assert_eq!(stub.allocated(Kind::Buffer), 2);
    assert_eq!(stub.live(Kind::Buffer), 1);
    assert_eq!(compiler.reply(), Some(second));
    assert_eq!(compiler.reply_bytes(), Some(&b"main1"[..]));
}

#[test]
fn test_failed_build_releases_previous_reply() {
    init_logging();
    let stub = StubToolchain::legacy().with_functions(&["main0"]);
    let mut compiler = CompilerHandle::create(&stub.providers(), CreateArgs::Legacy).unwrap();

    compiler.build(&options(&["main0"]), 0, stub.module()).unwrap();
    assert!(compiler.build(&options(&["missing"]), 0, stub.module()).is_err());

    assert_eq!(stub.live(Kind::Buffer), 0);
    assert!(!compiler.has_outstanding_reply());
    let message = compiler.last_error().unwrap().to_str().unwrap();
    assert!(message.contains("missing"), "unexpected message: {message}");
}

#[test]
fn test_release_clears_last_error() {
    init_logging();
    let stub = StubToolchain::legacy();
    let mut compiler = CompilerHandle::create(&stub.providers(), CreateArgs::Legacy).unwrap();

    assert!(compiler.build(&[], 0, stub.module()).is_err());
    assert!(compiler.last_error().is_some());

    compiler.release_reply();
    assert!(compiler.last_error().is_none());
}

#[test]
fn test_drop_with_outstanding_reply() {
    init_logging();
    let stub = StubToolchain::legacy().with_functions(&["main0"]);
    let mut compiler = CompilerHandle::create(&stub.providers(), CreateArgs::Legacy).unwrap();

    compiler.build(&options(&["main0"]), 0, stub.module()).unwrap();
    drop(compiler);

    assert_eq!(stub.live(Kind::Buffer), 0);
    assert_eq!(stub.live(Kind::Compiler), 0);
    assert_eq!(stub.calls("dispose_buffer"), 1);
    assert_eq!(stub.calls("destroy_compiler"), 1);
}

#[test]
fn test_handles_are_independent() {
    init_logging();
    let stub = StubToolchain::legacy().with_functions(&["main0", "main1"]);
    let providers = stub.providers();
    let mut first = CompilerHandle::create(&providers, CreateArgs::Legacy).unwrap();
    let mut second = CompilerHandle::create(&providers, CreateArgs::Legacy).unwrap();

    first.build(&options(&["main0"]), 0, stub.module()).unwrap();
    second.build(&options(&["main1"]), 0, stub.module()).unwrap();
    first.release_reply();

    assert_eq!(second.reply_bytes(), Some(&b"main1"[..]));
    assert_eq!(stub.live(Kind::Buffer), 1);
    assert_eq!(stub.live(Kind::Compiler), 2);
}
