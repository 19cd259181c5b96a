use std::path::PathBuf;

use classcov::options::{AgentOptions, OptionsError, DEFAULT_EXCL_CLASSLOADER};

#[test]
fn empty_string_yields_defaults() {
    let options = AgentOptions::parse("").unwrap();
    assert_eq!(options.includes, "*");
    assert_eq!(options.excludes, "");
    assert_eq!(options.excl_classloader, DEFAULT_EXCL_CLASSLOADER);
    assert!(options.class_dump_dir.is_none());
}

#[test]
fn every_key_is_recognized() {
    let options = AgentOptions::parse(
        "includes=com/ex/*,excludes=com/ex/gen/*:*Test,exclclassloader=my.Loader,classdumpdir=/tmp/dump",
    )
    .unwrap();
    assert_eq!(options.includes, "com/ex/*");
    assert_eq!(options.excludes, "com/ex/gen/*:*Test");
    assert_eq!(options.excl_classloader, "my.Loader");
    assert_eq!(options.class_dump_dir, Some(PathBuf::from("/tmp/dump")));
}

#[test]
fn unset_keys_keep_their_defaults() {
    let options = AgentOptions::parse("excludes=*Generated").unwrap();
    assert_eq!(options.includes, "*", "includes untouched");
    assert_eq!(options.excludes, "*Generated");
    assert_eq!(options.excl_classloader, DEFAULT_EXCL_CLASSLOADER);
}

#[test]
fn later_entries_win() {
    let options = AgentOptions::parse("includes=a/*,includes=b/*").unwrap();
    assert_eq!(options.includes, "b/*");
}

#[test]
fn empty_entries_are_ignored() {
    // A trailing comma must not be treated as a malformed entry.
    let options = AgentOptions::parse("includes=com/ex/*,").unwrap();
    assert_eq!(options.includes, "com/ex/*");
}

#[test]
fn unknown_key_is_rejected() {
    let err = AgentOptions::parse("inculdes=com/ex/*").unwrap_err();
    match err {
        OptionsError::UnknownOption(key) => assert_eq!(key, "inculdes"),
        other => panic!("expected UnknownOption, got {other:?}"),
    }
}

#[test]
fn bare_token_without_equals_is_rejected() {
    let err = AgentOptions::parse("verbose").unwrap_err();
    match err {
        OptionsError::InvalidEntry(entry) => assert_eq!(entry, "verbose"),
        other => panic!("expected InvalidEntry, got {other:?}"),
    }
}

#[test]
fn value_may_contain_equals() {
    // Only the first `=` splits key from value.
    let options = AgentOptions::parse("excludes=a=b").unwrap();
    assert_eq!(options.excludes, "a=b");
}
