//! Writing a chroot out and reading it back must not change what it reports

use chrootbox::chroot::{Chroot, SessionRequest};
use chrootbox::config::types::Verbosity;
use chrootbox::config::{Diagnostics, Keyfile};
use chrootbox::facet::storage::{BtrfsSnapshotFacet, FileFacet, LvmSnapshotFacet};
use chrootbox::facet::{PersonalityFacet, UnionFacet, UserdataFacet};

const COMMON: &str = "\
description=Debian sid
aliases=unstable,default
users=alice,bob
groups=sbuild
root-users=admin
root-groups=root
environment-filter=^(LD_.*|IFS)$
message-verbosity=verbose
preserve-environment=true
shell=/bin/zsh
command-prefix=eatmydata,nice
run-setup-scripts=false
personality=linux32
setup.fstab=sbuild/fstab
user-modifiable-keys=setup.fstab
";

const TYPES: &[(&str, &str)] = &[
    ("block-device", "device=/dev/vg/sid\nmount-options=-o noatime\nlocation=/srv\nunion-type=overlay\nunion-mount-options=xino=off\nsource-users=builder\n"),
    ("loopback", "file=/srv/images/sid.img\nunion-type=aufs\n"),
    ("lvm-snapshot", "device=/dev/vg/sid\nlvm-snapshot-options=--size 2G\nsource-clone=true\nsource-groups=admins\n"),
    ("btrfs-snapshot", "btrfs-source-subvolume=/srv/btrfs/sid\nbtrfs-snapshot-directory=/srv/btrfs/snapshots\n"),
    ("directory", "directory=/srv/chroot/sid\nunion-type=overlay\nunion-overlay-directory=/var/overlay\n"),
    ("file", "file=/srv/sid.tar.gz\nlocation=/sid\nsource-root-users=packer\n"),
    ("custom", "custom-session-cloneable=true\ncustom-session-purgeable=true\ncustom-source-cloneable=true\nmount-location=/mnt/custom\n"),
];

fn definition(chroot_type: &str, extra: &str) -> Keyfile {
    Keyfile::parse(&format!("[sid]\ntype={}\n{}{}", chroot_type, COMMON, extra)).unwrap()
}

fn reread(chroot: &Chroot, session: bool) -> Chroot {
    let mut keyfile = Keyfile::new();
    chroot.get_keyfile(&mut keyfile);
    let text = keyfile.to_string();

    let parsed = Keyfile::parse(&text).unwrap();
    assert_eq!(parsed, keyfile, "keyfile text did not parse back:\n{}", text);

    let mut diagnostics = Diagnostics::new();
    let copy = Chroot::from_keyfile(&parsed, chroot.name(), session, &mut diagnostics).unwrap();
    assert!(diagnostics.is_empty(), "{:?}\n{}", diagnostics, text);
    copy
}

#[test]
fn test_templates_round_trip() {
    for (chroot_type, extra) in TYPES {
        let mut diagnostics = Diagnostics::new();
        let original =
            Chroot::from_keyfile(&definition(chroot_type, extra), "sid", false, &mut diagnostics)
                .unwrap();
        assert!(diagnostics.is_empty(), "{}: {:?}", chroot_type, diagnostics);
        assert_eq!(original.chroot_type(), *chroot_type);

        let copy = reread(&original, false);
        assert_eq!(
            copy.details().to_string(),
            original.details().to_string(),
            "{} details changed",
            chroot_type
        );
        assert_eq!(copy.facet_kinds(), original.facet_kinds());
    }
}

#[test]
fn test_sessions_round_trip() {
    for (chroot_type, extra) in TYPES {
        let mut diagnostics = Diagnostics::new();
        let template =
            Chroot::from_keyfile(&definition(chroot_type, extra), "sid", false, &mut diagnostics)
                .unwrap();
        let session = template
            .clone_session(&SessionRequest::new("sid-1", "unstable").with_user("alice"))
            .unwrap();

        let copy = reread(&session, true);
        assert_eq!(
            copy.details().to_string(),
            session.details().to_string(),
            "{} session details changed",
            chroot_type
        );
        assert_eq!(copy.facet_kinds(), session.facet_kinds());
    }
}

#[test]
fn test_common_keys_are_read() {
    let mut diagnostics = Diagnostics::new();
    let chroot = Chroot::from_keyfile(
        &definition("directory", "directory=/srv/chroot/sid\n"),
        "sid",
        false,
        &mut diagnostics,
    )
    .unwrap();

    assert_eq!(chroot.verbosity(), Verbosity::Verbose);
    assert!(chroot.preserve_environment());
    assert!(!chroot.run_setup_scripts());
    assert_eq!(chroot.command_prefix(), &["eatmydata".to_string(), "nice".to_string()]);
    assert_eq!(
        chroot.get_facet::<PersonalityFacet>().unwrap().personality(),
        "linux32"
    );
    assert_eq!(
        chroot.get_facet::<UserdataFacet>().unwrap().get_data("setup.fstab"),
        Some("sbuild/fstab")
    );
}

#[test]
fn test_session_only_keys_written_for_sessions() {
    let mut lvm = Chroot::create("lvm-snapshot", "sid").unwrap();
    lvm.add_facet(LvmSnapshotFacet::new("/dev/vg/sid", "--size 2G")).unwrap();
    let mut btrfs = Chroot::create("btrfs-snapshot", "sid").unwrap();
    btrfs
        .add_facet(BtrfsSnapshotFacet::new("/srv/btrfs/sid", "/srv/btrfs/snapshots"))
        .unwrap();
    let mut file = Chroot::create("file", "sid").unwrap();
    file.add_facet(FileFacet::new("/srv/sid.tar")).unwrap();

    for (template, key) in [
        (&lvm, "lvm-snapshot-device"),
        (&btrfs, "btrfs-snapshot-name"),
        (&file, "file-repack"),
    ] {
        let mut keyfile = Keyfile::new();
        template.get_keyfile(&mut keyfile);
        assert!(!keyfile.has_key("sid", key), "{} written for a template", key);

        let session = template.clone_session(&SessionRequest::new("s1", "sid")).unwrap();
        let mut keyfile = Keyfile::new();
        session.get_keyfile(&mut keyfile);
        assert!(keyfile.has_key("s1", key), "{} missing from the session", key);
    }
}

#[test]
fn test_union_round_trip_preserves_directories() {
    let mut diagnostics = Diagnostics::new();
    let chroot = Chroot::from_keyfile(
        &definition("directory", "directory=/srv/d\nunion-type=overlay\nunion-overlay-directory=/var/ov\n"),
        "sid",
        false,
        &mut diagnostics,
    )
    .unwrap();
    let copy = reread(&chroot, false);
    let union = copy.get_facet::<UnionFacet>().unwrap();
    assert_eq!(union.union_type(), "overlay");
    assert_eq!(union.overlay_directory(), std::path::Path::new("/var/ov"));
}

#[test]
fn test_multiline_values_stay_in_their_key() {
    let mut diagnostics = Diagnostics::new();
    let template = Chroot::from_keyfile(
        &definition("directory", "directory=/srv/chroot/sid\n"),
        "sid",
        false,
        &mut diagnostics,
    )
    .unwrap();
    let mut session = template
        .clone_session(&SessionRequest::new("s1", "sid").with_user("alice"))
        .unwrap();
    session.set_description("Debian\nroot-groups=wheel");
    let overrides: std::collections::BTreeMap<String, String> =
        [("setup.fstab".to_string(), "x\nroot-users=alice".to_string())]
            .into_iter()
            .collect();
    session
        .get_facet_mut::<UserdataFacet>()
        .unwrap()
        .apply_overrides(&overrides, false)
        .unwrap();

    let copy = reread(&session, true);
    assert_eq!(copy.description(), "Debian\nroot-groups=wheel");
    assert!(copy.root_groups().is_empty());
    assert!(copy.root_users().is_empty());
    assert_eq!(
        copy.get_facet::<UserdataFacet>().unwrap().get_data("setup.fstab"),
        Some("x\nroot-users=alice")
    );
    assert_eq!(copy.details().to_string(), session.details().to_string());
}
