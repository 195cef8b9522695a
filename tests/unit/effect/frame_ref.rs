use super::*;

fn ok(name: &str, current: u32) -> Option<FrameRef> {
    FrameRef::parse(name, current).unwrap()
}

#[test]
fn fixed_names() {
    assert_eq!(ok("IN", 3), Some(FrameRef::new(3, 0)));
    assert_eq!(ok("$IN", 3), Some(FrameRef::new(3, 0)));
    assert_eq!(ok("ORIG", 3), Some(FrameRef::new(0, 0)));
    assert_eq!(ok("$ORIG", 0), Some(FrameRef::new(0, 0)));
}

#[test]
fn history_frames_of_the_source() {
    assert_eq!(ok("PREV", 2), Some(FrameRef::new(0, 1)));
    assert_eq!(ok("PREV1", 2), Some(FrameRef::new(0, 2)));
    assert_eq!(ok("PREV6", 0), Some(FrameRef::new(0, 7)));
    assert!(FrameRef::parse("PREV0", 2).is_err());
    assert!(FrameRef::parse("PREV7", 2).is_err());
}

#[test]
fn earlier_pass_outputs() {
    assert_eq!(ok("PASSPREV", 3), Some(FrameRef::new(2, 0)));
    assert_eq!(ok("PASSPREV2", 3), Some(FrameRef::new(0, 0)));
    assert!(FrameRef::parse("PASSPREV0", 3).is_err());
    assert!(FrameRef::parse("PASSPREV3", 3).is_err());
    assert!(FrameRef::parse("PASSPREV", 0).is_err());

    assert_eq!(ok("PASS1", 3), Some(FrameRef::new(1, 0)));
    assert_eq!(ok("PASS2", 3), Some(FrameRef::new(2, 0)));
    assert_eq!(ok("PASS12", 13), Some(FrameRef::new(12, 0)));
    assert!(FrameRef::parse("PASS", 3).is_err());
    assert!(FrameRef::parse("PASS0", 3).is_err());
    assert!(FrameRef::parse("PASS3", 3).is_err());
}

#[test]
fn unrelated_names_are_not_frames() {
    assert_eq!(ok("", 1), None);
    assert_eq!(ok("$", 1), None);
    assert_eq!(ok("in", 1), None);
    assert_eq!(ok("LUT", 1), None);
    assert_eq!(ok("LUT2", 1), None);
    assert_eq!(ok("params", 1), None);
    assert_eq!(ok("PREVIOUS", 1), None);
}

#[test]
fn errors_name_the_pass() {
    let err = FrameRef::parse("PASS5", 2).unwrap_err();
    assert_eq!(
        err.to_string(),
        "validation error: invalid reference from pass 2 to parameter 'PASS5'"
    );
}
