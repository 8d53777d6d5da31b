use std::f32::consts::FRAC_PI_2;

use approx::assert_relative_eq;
use nalgebra::{Matrix4, Rotation3, Vector3};
use rigport_core::{
    basis_to_authoring, BoneDescriptor, CFrame, Rig, RigError, RigMetadata, RiggingMode,
};

fn cf(t: [f32; 3]) -> CFrame {
    CFrame([t[0], t[1], t[2], 1., 0., 0., 0., 1., 0., 0., 0., 1.])
}

fn node(
    name: &str,
    t: [f32; 3],
    joints: Option<([f32; 3], [f32; 3])>,
    children: Vec<BoneDescriptor>,
) -> BoneDescriptor {
    BoneDescriptor {
        jname: name.into(),
        transform: cf(t),
        jointtransform0: joints.map(|(j0, _)| cf(j0)),
        jointtransform1: joints.map(|(_, j1)| cf(j1)),
        children,
        aux: vec![],
    }
}

fn meta(rig: BoneDescriptor) -> RigMetadata {
    RigMetadata {
        rig_name: "Test".into(),
        parts: vec![],
        rig,
    }
}

fn r6() -> RigMetadata {
    rigport_test_fixtures::rigs::load("r6").expect("r6 fixture")
}

#[test]
fn builds_r6_hierarchy() {
    let rig = Rig::build(&r6(), RiggingMode::LocalYAxisExtend).unwrap();
    assert_eq!(rig.len(), 7);

    let root = rig.bone("HumanoidRootPart").unwrap();
    assert!(root.hide_select);
    assert!(!root.transformable);
    assert!(root.parent.is_none());

    let torso = rig.bone("Torso").unwrap();
    assert!(torso.transformable);
    assert_eq!(torso.children.len(), 5);
    assert_eq!(rig.bone_at(torso.parent.unwrap()).name, "HumanoidRootPart");

    for name in ["Head", "Left Arm", "Right Arm", "Left Leg", "Right Leg"] {
        let bone = rig.bone(name).unwrap();
        assert_eq!(rig.bone_at(bone.parent.unwrap()).name, "Torso");
        assert_eq!(bone.aux, vec![name.to_string()]);
    }
}

#[test]
fn head_positions_follow_joint_transforms() {
    let rig = Rig::build(&r6(), RiggingMode::LocalYAxisExtend).unwrap();
    // Head joint sits at (0, 4, 0) in source space -> (0, 0, 4) in authoring.
    let head = rig.bone("Head").unwrap();
    assert_relative_eq!(head.head, Vector3::new(0.0, 0.0, 4.0), epsilon = 1e-5);
    // Leafs reflect away from the neutral position: neutral (0,0,4.5),
    // tail = head - 2*(head - neutral) = (0, 0, 5).
    assert_relative_eq!(head.tail, Vector3::new(0.0, 0.0, 5.0), epsilon = 1e-5);
}

#[test]
fn rebuild_is_idempotent() {
    let meta = r6();
    let a = Rig::build(&meta, RiggingMode::Connect).unwrap();
    let b = Rig::build(&meta, RiggingMode::Connect).unwrap();
    assert_eq!(a.len(), b.len());
    for (x, y) in a.bones().iter().zip(b.bones().iter()) {
        assert_eq!(x.name, y.name);
        assert_eq!(x.parent, y.parent);
        assert_relative_eq!(x.matrix_local, y.matrix_local, epsilon = 1e-6);
        assert_relative_eq!(x.transform, y.transform, epsilon = 1e-6);
    }
}

#[test]
fn degenerate_connect_falls_back_to_fixed_tail() {
    // Child joint coincides with the bone head; CONNECT would produce a
    // zero-length bone and must revert to the 0.25 offset tail.
    let tree = node(
        "Root",
        [0., 0., 0.],
        None,
        vec![node(
            "A",
            [0., 1., 0.],
            Some(([0., 0., 0.], [0., 0., 0.])),
            vec![node(
                "B",
                [0., 1., 0.],
                Some(([0., 0., 0.], [0., 0., 0.])),
                vec![],
            )],
        )],
    );
    let rig = Rig::build(&meta(tree), RiggingMode::Connect).unwrap();
    let a = rig.bone("A").unwrap();
    assert_relative_eq!((a.tail - a.head).norm(), 0.25, epsilon = 1e-5);
}

#[test]
fn connect_snaps_tail_onto_single_child() {
    let tree = node(
        "Root",
        [0., 0., 0.],
        None,
        vec![node(
            "A",
            [0., 1., 0.],
            Some(([0., 0., 0.], [0., 0., 0.])),
            vec![node(
                "B",
                [0., 2.5, 0.],
                Some(([0., 0., 0.], [0., 0., 0.])),
                vec![],
            )],
        )],
    );
    let rig = Rig::build(&meta(tree), RiggingMode::Connect).unwrap();
    let a = rig.bone("A").unwrap();
    // B's joint lives at (0, 2.5, 0) in source space -> (0, 0, 2.5).
    assert_relative_eq!(a.tail, Vector3::new(0.0, 0.0, 2.5), epsilon = 1e-5);
}

/// Root -> A -> B where B's joint sits off A's local axes, for the
/// single-child projection heuristics.
fn off_axis_child_meta(child_joint: [f32; 3]) -> RigMetadata {
    meta(node(
        "Root",
        [0., 0., 0.],
        None,
        vec![node(
            "A",
            [0., 1., 0.],
            Some(([0., 0., 0.], [0., 0., 0.])),
            vec![node(
                "B",
                child_joint,
                Some(([0., 0., 0.], [0., 0., 0.])),
                vec![],
            )],
        )],
    ))
}

#[test]
fn single_child_projects_onto_local_y() {
    // B's joint lands at (2, 0, 1.5) in authoring space; its projection onto
    // A's local Y (head (0,0,1), axis +Z) reaches 0.5 past the head.
    let rig = Rig::build(&off_axis_child_meta([2., 1.5, 0.]), RiggingMode::LocalYAxisExtend)
        .unwrap();
    let a = rig.bone("A").unwrap();
    assert_relative_eq!(a.tail, Vector3::new(0.0, 0.0, 1.5), epsilon = 1e-5);
}

#[test]
fn single_child_picks_the_best_aligned_axis() {
    // Same geometry: in A's local frame the child sits at (2, 0.5, 0), so the
    // local X axis dominates and the tail extends along it instead.
    let rig = Rig::build(&off_axis_child_meta([2., 1.5, 0.]), RiggingMode::LocalAxisExtend)
        .unwrap();
    let a = rig.bone("A").unwrap();
    assert_relative_eq!(a.tail, Vector3::new(2.0, 0.0, 1.0), epsilon = 1e-5);
}

#[test]
fn axis_ties_resolve_to_local_y() {
    // Child at local (1, 1, 0): equal X and Y alignment, Y wins.
    let rig = Rig::build(&off_axis_child_meta([1., 2., 0.]), RiggingMode::LocalAxisExtend)
        .unwrap();
    let a = rig.bone("A").unwrap();
    assert_relative_eq!(a.tail, Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-5);
}

#[test]
fn nice_transform_relates_neutral_and_adjusted_matrices() {
    let rig = Rig::build(&r6(), RiggingMode::LocalYAxisExtend).unwrap();
    for name in ["Torso", "Head", "Left Arm"] {
        let bone = rig.bone(name).unwrap();
        let o_trans = basis_to_authoring() * (bone.transform * bone.transform1);
        assert_relative_eq!(o_trans * bone.nice_transform, bone.matrix_local, epsilon = 1e-4);
    }
}

#[test]
fn malformed_descriptor_is_fatal() {
    let mut bad = node(
        "Root",
        [0., 0., 0.],
        None,
        vec![node(
            "A",
            [0., 1., 0.],
            Some(([0., 0., 0.], [0., 0., 0.])),
            vec![],
        )],
    );
    bad.children[0].jointtransform1 = None;
    let err = Rig::build(&meta(bad), RiggingMode::Raw).unwrap_err();
    assert_eq!(err, RigError::MalformedDescriptor { bone: "A".into() });
}

#[test]
fn attachments_keep_link_time_placement() {
    let mut rig = Rig::build(&r6(), RiggingMode::Raw).unwrap();
    let object_world = Matrix4::new_translation(&Vector3::new(0.5, 0.0, 4.0));
    rig.link_attachment("Head", "Hat", &object_world).unwrap();

    // While the linking pose holds, the object stays where it was linked.
    rig.evaluate_frame(0);
    let world = rig.attachment_world("Head", "Hat").unwrap();
    assert_relative_eq!(world, object_world, epsilon = 1e-4);

    // Posing the bone carries the object along rigidly.
    let head = rig.index_of("Head").unwrap();
    let spin = Rotation3::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2).to_homogeneous();
    rig.set_basis_key(head, 0, spin);
    rig.evaluate_frame(0);

    let bone = rig.bone("Head").unwrap();
    let expected = bone.matrix_pose * bone.matrix_local.try_inverse().unwrap() * object_world;
    let posed = rig.attachment_world("Head", "Hat").unwrap();
    assert_relative_eq!(posed, expected, epsilon = 1e-4);
}
