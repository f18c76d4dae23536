//! Integration tests for writing DAS files and verifying round-trip.

use das::graph::*;
use das::util::{Mat4, Quat, Vec3};
use das::{read_file, write_file, ScopeWriter};

use tempfile::NamedTempFile;

/// Graph touching every entity kind and every optional field.
fn full_graph() -> EntityGraph {
    let mut g = EntityGraph::new(Properties {
        model: "crate".into(),
        author: "A".into(),
        copyright: "(c) nobody".into(),
        moddate: 1_700_000_000,
        compression: false,
    });

    let indices = [0u32, 1, 2];
    let positions = [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.5, 1.0, 0.0];
    let normals = [0.0f32, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
    let uvs = [0.0f32, 0.0, 1.0, 0.0, 0.5, 1.0];
    let morphed = [0.0f32, 0.1, 0.0, 1.0, 0.1, 0.0, 0.5, 1.1, 0.0];

    let ib = g.add_buffer(BufferView::from_pod(BufferType::INDICES, &indices).to_buffer());
    let mut vertex_view = BufferView::from_pod(BufferType::VERTEX, &positions);
    let morph_offset = vertex_view.push_pod(&morphed) as u32;
    let vb = g.add_buffer(vertex_view.to_buffer());
    let nb = g.add_buffer(BufferView::from_pod(BufferType::VERTEX_NORMAL, &normals).to_buffer());
    let ub = g.add_buffer(BufferView::from_pod(BufferType::TEXTURE_MAP, &uvs).to_buffer());
    // Payload bytes that look like scope syntax must survive untouched.
    let tb = g.add_buffer(Buffer::new(
        BufferType::TEXTURE_PNG,
        b"\x89PNG\r\nENDSCOPE\nMODEL\n\"\n".to_vec(),
    ));

    let target = g.add_morph_target(MorphTarget {
        vertices: AttributeRef::new(vb, morph_offset),
        normals: Some(AttributeRef::new(nb, 0)),
        uvs: Some(AttributeRef::new(ub, 0)),
    });
    let prim = g.add_primitive(
        MeshPrimitive::new(AttributeRef::new(ib, 0), 3, AttributeRef::new(vb, 0))
            .with_normals(AttributeRef::new(nb, 0))
            .with_uvs(AttributeRef::new(ub, 0))
            .with_texture(tb)
            .with_morph_targets(vec![target]),
    );
    let model = g.add_model(
        Model::new("crate")
            .with_primitive(prim)
            .with_transform(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0))),
    );

    let mut anim = Animation::new("spin")
        .with_model(model)
        .with_interpolation(Interpolation::CubicSpline);
    anim.push_keyframe(
        Keyframe::at(0.0)
            .with_translation(Vec3::ZERO)
            .with_rotation(Quat::IDENTITY),
    );
    anim.push_keyframe(
        Keyframe::at(1.25)
            .with_rotation(Quat::from_rotation_y(1.0))
            .with_scale(Vec3::splat(2.0))
            .with_weights(vec![0.25]),
    );
    g.add_animation(anim);

    let mut rig = Skeleton::new("rig");
    rig.push_joint(Joint::new("hip").with_children(vec![1]));
    rig.push_joint(
        Joint::new("knee")
            .with_inverse_bind(Mat4::from_translation(Vec3::NEG_Y))
            .with_transform(Mat4::from_scale(Vec3::splat(0.5))),
    );
    let skeleton = g.add_skeleton(rig);

    let mut scene = Scene::new("main");
    scene.is_default = true;
    let root = scene.push_node(SceneNode::new("root").with_model(model).with_children(vec![1]));
    scene.push_node(SceneNode::new("bones").with_skeleton(skeleton));
    scene.roots = vec![root];
    g.add_scene(scene);
    g.add_scene(Scene::new("empty"));
    g
}

#[test]
fn test_roundtrip_full_graph() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let path = temp.path();
    let graph = full_graph();

    write_file(path, &graph).expect("Failed to write file");
    let parsed = read_file(path).expect("Failed to read file");

    assert!(parsed.diagnostics.is_empty());
    assert_eq!(parsed.graph, graph);
    let report = parsed.graph.validate();
    assert!(report.is_clean(), "{}", report);
}

#[test]
fn test_roundtrip_minimal_scenario() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let path = temp.path();

    let mut graph = EntityGraph::new(Properties::default().with_author("A"));
    let indices = [0u32, 1, 2];
    let buffer = graph.add_buffer(
        BufferView::from_pod(BufferType::INDICES | BufferType::VERTEX, &indices).to_buffer(),
    );
    let prim = graph.add_primitive(MeshPrimitive::new(
        AttributeRef::new(buffer, 0),
        3,
        AttributeRef::new(buffer, 0),
    ));
    graph.add_model(Model::new("tri").with_primitive(prim));

    write_file(path, &graph).expect("Failed to write file");
    let parsed = read_file(path).expect("Failed to read file");
    let g = &parsed.graph;

    assert_eq!(g.properties.author, "A");
    assert_eq!(g.buffer(0).unwrap().len(), 12);
    assert_eq!(g.primitive(0).unwrap().index_count, 3);
    assert_eq!(g.model_primitives(0).unwrap().len(), 1);
    assert_eq!(g.validate().errors().count(), 0);

    // The file declared no scene, so the reader added the library scene.
    assert_eq!(g.scenes.len(), 1);
    assert!(g.scenes[0].synthesized);
    assert_eq!(g.scenes[0].nodes[0].model, Some(0));
}

#[test]
fn test_synthesized_scene_not_written() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let path = temp.path();

    let mut graph = EntityGraph::new(Properties::new("lib"));
    for name in ["a", "b", "c", "d"] {
        graph.add_model(Model::new(name));
    }
    graph.synthesize_default_scene();

    write_file(path, &graph).expect("Failed to write file");
    let text = std::fs::read(path).unwrap();
    assert!(!text.windows(6).any(|w| w == b"SCENE\n"));

    // Reading synthesizes it again, with one node per model.
    let parsed = read_file(path).expect("Failed to read file");
    assert_eq!(parsed.graph, graph);
    assert_eq!(parsed.graph.scenes[0].nodes.len(), 4);
}

#[test]
fn test_incremental_writer_offsets() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let path = temp.path();

    let positions = [1.0f32; 6];
    let extra = [2.0f32; 3];
    let placement;
    {
        let mut w = ScopeWriter::create(path).expect("Failed to create writer");
        let start = w.write_properties(&Properties::new("spans")).unwrap();
        assert_eq!(start, 8);

        let mut view = BufferView::from_pod(BufferType::VERTEX, &positions);
        view.push_pod(&extra);
        placement = w.write_buffer(&view).unwrap();
        assert!(placement.data > placement.scope);
        w.finish().unwrap();
    }

    let bytes = std::fs::read(path).unwrap();
    let data = placement.data as usize;
    assert_eq!(&bytes[data..data + 4], &1.0f32.to_le_bytes());
    assert_eq!(&bytes[data + 24..data + 28], &2.0f32.to_le_bytes());

    let parsed = read_file(path).unwrap();
    assert_eq!(parsed.graph.buffers[0].len(), 36);
}

#[test]
fn test_unfinished_file_rejected() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let path = temp.path();
    {
        let mut w = ScopeWriter::create(path).expect("Failed to create writer");
        w.write_properties(&Properties::default()).unwrap();
        // Dropped without finish.
    }
    assert!(matches!(read_file(path), Err(das::Error::NotFinalized)));
}

#[test]
fn test_long_strings_limited_to_reader_token_len() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let path = temp.path();
    let limit = das::das::DEFAULT_MAX_TOKEN_LEN;

    let mut too_long = EntityGraph::new(Properties::new("long"));
    too_long.add_model(Model::new("x".repeat(70_000)));
    let err = write_file(path, &too_long).unwrap_err();
    assert!(matches!(err, das::Error::InvalidInput(_)));

    // The longest accepted string still reads back with the default config.
    let mut at_limit = EntityGraph::new(Properties::new("long"));
    at_limit.add_model(Model::new("x".repeat(limit)));
    write_file(path, &at_limit).expect("Failed to write file");
    let parsed = read_file(path).expect("Failed to read file");
    assert_eq!(parsed.graph.models[0].name.len(), limit);
    assert_eq!(parsed.graph, at_limit);
}
