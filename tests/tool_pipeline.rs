//! End-to-end tests of event processing through devices, slots and tools

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use glam::{DMat4, DVec3, DVec4};
use tool_system::config::{VirtualDeviceConfig, VirtualMapping};
use tool_system::{
    AxisState, DeviceRegistry, EventSource, InputSlot, NodeId, PickResult, PickSystem, ScenePath,
    Tool, ToolContext, ToolEvent, ToolSystem, ToolSystemConfig, Transformation, Viewer,
};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Activate(InputSlot, ScenePath),
    Perform(InputSlot, ScenePath),
    Deactivate(InputSlot, ScenePath),
}

type Log = Arc<Mutex<Vec<(&'static str, Call)>>>;

struct Recorder {
    name: &'static str,
    activation: Vec<InputSlot>,
    current: Vec<InputSlot>,
    reject: bool,
    log: Log,
}

impl Recorder {
    fn new(name: &'static str, activation: Vec<InputSlot>, current: Vec<InputSlot>, log: &Log) -> Self {
        Self {
            name,
            activation,
            current,
            reject: false,
            log: log.clone(),
        }
    }

    fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }
}

impl Tool for Recorder {
    fn activation_slots(&self) -> &[InputSlot] {
        &self.activation
    }

    fn current_slots(&self) -> &[InputSlot] {
        &self.current
    }

    fn activate(&mut self, ctx: &mut ToolContext<'_>) {
        if self.reject {
            ctx.reject();
            return;
        }
        let call = Call::Activate(ctx.source(), ctx.root_to_local().clone());
        self.log.lock().unwrap().push((self.name, call));
    }

    fn perform(&mut self, ctx: &mut ToolContext<'_>) {
        let call = Call::Perform(ctx.source(), ctx.root_to_local().clone());
        self.log.lock().unwrap().push((self.name, call));
    }

    fn deactivate(&mut self, ctx: &mut ToolContext<'_>) {
        let call = Call::Deactivate(ctx.source(), ctx.root_to_local().clone());
        self.log.lock().unwrap().push((self.name, call));
    }
}

struct FixedViewer;

impl Viewer for FixedViewer {
    fn scene_root(&self) -> NodeId {
        NodeId(0)
    }

    fn camera_path(&self) -> Option<ScenePath> {
        None
    }

    fn path_matrix(&self, _path: &ScenePath) -> DMat4 {
        DMat4::IDENTITY
    }

    fn camera_to_ndc(&self) -> Option<DMat4> {
        None
    }
}

/// Camera that moves a little every time it is looked at
struct DriftingViewer {
    frames: AtomicU64,
}

impl Viewer for DriftingViewer {
    fn scene_root(&self) -> NodeId {
        NodeId(0)
    }

    fn camera_path(&self) -> Option<ScenePath> {
        Some(path(&[0, 7]))
    }

    fn path_matrix(&self, _path: &ScenePath) -> DMat4 {
        let frame = self.frames.fetch_add(1, Ordering::SeqCst);
        DMat4::from_translation(DVec3::new(frame as f64, 0.0, 0.0))
    }

    fn camera_to_ndc(&self) -> Option<DMat4> {
        None
    }
}

/// Camera placed at whatever x offset a tool last wrote
struct SharedCameraViewer {
    x: Arc<AtomicU64>,
}

impl Viewer for SharedCameraViewer {
    fn scene_root(&self) -> NodeId {
        NodeId(0)
    }

    fn camera_path(&self) -> Option<ScenePath> {
        Some(path(&[0, 7]))
    }

    fn path_matrix(&self, _path: &ScenePath) -> DMat4 {
        let x = self.x.load(Ordering::SeqCst);
        DMat4::from_translation(DVec3::new(x as f64, 0.0, 0.0))
    }

    fn camera_to_ndc(&self) -> Option<DMat4> {
        None
    }
}

struct FixedPick(Vec<PickResult>);

impl PickSystem for FixedPick {
    fn compute_pick(&mut self, _from: DVec4, _to: DVec4) -> Vec<PickResult> {
        self.0.clone()
    }
}

fn path(ids: &[u64]) -> ScenePath {
    ids.iter().map(|&i| NodeId(i)).collect()
}

fn axis(slot: InputSlot, value: f64) -> ToolEvent {
    ToolEvent::from_axis(EventSource::new("test"), 0, slot, AxisState::new(value))
}

fn mouse_config() -> ToolSystemConfig {
    let mut config = ToolSystemConfig::default();
    config.virtual_mappings.push(VirtualMapping {
        source: "LeftButton".into(),
        target: "PrimaryAction".into(),
    });
    config
}

fn build(config: &ToolSystemConfig) -> ToolSystem {
    ToolSystem::new(Box::new(FixedViewer), config, &DeviceRegistry::with_builtins()).unwrap()
}

fn hit(nodes: &[u64]) -> Box<FixedPick> {
    Box::new(FixedPick(vec![PickResult::geometry_hit(
        path(nodes),
        NodeId(99),
        DVec4::new(0.0, 0.0, 0.0, 1.0),
    )]))
}

fn calls(log: &Log) -> Vec<(&'static str, Call)> {
    log.lock().unwrap().clone()
}

#[test]
fn test_alias_press_activates_and_release_deactivates() {
    let system = build(&mouse_config());
    let slots = system.slots().clone();
    let (left, primary, drag) = (slots.slot("LeftButton"), slots.slot("PrimaryAction"), slots.slot("Drag"));
    let log = Log::default();
    let tool = system.register(Recorder::new("drag", vec![primary], vec![drag], &log));
    system.add_tool(tool, path(&[0])).unwrap();

    system.process_event(axis(left, 1.0));
    system.process_event(axis(drag, 0.3));
    system.process_event(axis(left, 0.0));
    system.process_event(axis(drag, 0.4));

    let root = path(&[0]);
    assert_eq!(
        calls(&log),
        vec![
            ("drag", Call::Activate(primary, root.clone())),
            ("drag", Call::Perform(drag, root.clone())),
            ("drag", Call::Deactivate(primary, root)),
        ]
    );
}

#[test]
fn test_deepest_attachment_wins_and_siblings_share() {
    let system = build(&mouse_config());
    let primary = system.slots().slot("PrimaryAction");
    let left = system.slots().slot("LeftButton");
    system.set_pick_system(hit(&[0, 1, 2]));

    let log = Log::default();
    let outer = system.register(Recorder::new("outer", vec![primary], vec![], &log));
    let first = system.register(Recorder::new("first", vec![primary], vec![], &log));
    let second = system.register(Recorder::new("second", vec![primary], vec![], &log));
    system.add_tool(outer, path(&[0])).unwrap();
    system.add_tool(first, path(&[0, 1])).unwrap();
    system.add_tool(second, path(&[0, 1])).unwrap();

    system.process_event(axis(left, 1.0));

    assert!(!system.is_active(outer));
    assert_eq!(system.active_paths(first), vec![path(&[0, 1, 2])]);
    assert_eq!(system.active_paths(second), vec![path(&[0, 1, 2])]);
}

#[test]
fn test_rejection_falls_back_to_ancestor() {
    let system = build(&mouse_config());
    let primary = system.slots().slot("PrimaryAction");
    let left = system.slots().slot("LeftButton");
    system.set_pick_system(hit(&[0, 1, 2]));

    let log = Log::default();
    let outer = system.register(Recorder::new("outer", vec![primary], vec![], &log));
    let inner = system.register(Recorder::new("inner", vec![primary], vec![], &log).rejecting());
    system.add_tool(outer, path(&[0])).unwrap();
    system.add_tool(inner, path(&[0, 1])).unwrap();

    system.process_event(axis(left, 1.0));

    assert!(!system.is_active(inner));
    assert!(system.is_active(outer));
    assert_eq!(
        calls(&log),
        vec![("outer", Call::Activate(primary, path(&[0, 1, 2])))]
    );
}

#[test]
fn test_press_on_picked_group_activates_once_and_release_ends_it() {
    let system = build(&ToolSystemConfig::default());
    let button = system.slots().slot("Button1");
    let drag = system.slots().slot("Drag");
    system.set_pick_system(Box::new(FixedPick(vec![PickResult::geometry_hit(
        path(&[0, 1]),
        NodeId(2),
        DVec4::new(0.0, 0.0, -1.0, 1.0),
    )])));
    let log = Log::default();
    let tool = system.register(Recorder::new("select", vec![button], vec![drag], &log));
    system.add_tool(tool, path(&[0, 1])).unwrap();

    system.process_event(axis(button, 1.0));
    system.process_event(axis(button, 0.0));
    system.process_event(axis(drag, 0.5));

    let group = path(&[0, 1]);
    assert_eq!(
        calls(&log),
        vec![
            ("select", Call::Activate(button, group.clone())),
            ("select", Call::Deactivate(button, group)),
        ]
    );
}

#[test]
fn test_detaching_outer_attachment_keeps_inner_instance() {
    let system = build(&mouse_config());
    let primary = system.slots().slot("PrimaryAction");
    let left = system.slots().slot("LeftButton");
    system.set_pick_system(hit(&[0, 1, 2]));
    let log = Log::default();
    let tool = system.register(Recorder::new("grab", vec![primary], vec![], &log));
    system.add_tool(tool, path(&[0])).unwrap();
    system.add_tool(tool, path(&[0, 1])).unwrap();
    system.process_event(axis(left, 1.0));
    assert_eq!(system.active_paths(tool), vec![path(&[0, 1, 2])]);

    system.remove_tool(tool, path(&[0])).unwrap();
    assert_eq!(system.active_paths(tool), vec![path(&[0, 1, 2])]);
    assert_eq!(system.attachments(tool), vec![path(&[0, 1])]);
    assert_eq!(calls(&log).len(), 1);

    system.remove_tool(tool, path(&[0, 1])).unwrap();
    assert!(!system.is_active(tool));
    assert_eq!(
        calls(&log).last(),
        Some(&("grab", Call::Deactivate(InputSlot::REMOVE, path(&[0, 1, 2]))))
    );
}

#[test]
fn test_repeated_press_does_not_reactivate() {
    let system = build(&mouse_config());
    let primary = system.slots().slot("PrimaryAction");
    let left = system.slots().slot("LeftButton");
    let log = Log::default();
    let tool = system.register(Recorder::new("tool", vec![primary], vec![], &log));
    system.add_tool(tool, path(&[0])).unwrap();

    system.process_event(axis(left, 1.0));
    system.process_event(axis(left, 0.9));
    system.process_event(axis(left, 1.0));

    let activations = calls(&log)
        .iter()
        .filter(|(_, call)| matches!(call, Call::Activate(..)))
        .count();
    assert_eq!(activations, 1);
}

#[test]
fn test_press_release_press_cycles_activation() {
    let system = build(&mouse_config());
    let primary = system.slots().slot("PrimaryAction");
    let left = system.slots().slot("LeftButton");
    let log = Log::default();
    let tool = system.register(Recorder::new("tap", vec![primary], vec![], &log));
    system.add_tool(tool, path(&[0])).unwrap();

    system.process_event(axis(left, 1.0));
    system.process_event(axis(left, 0.0));
    system.process_event(axis(left, 1.0));

    assert!(system.is_active(tool));
    assert_eq!(calls(&log).len(), 3);
}

#[test]
fn test_always_active_tool_follows_current_slots() {
    let system = build(&ToolSystemConfig::default());
    let wheel = system.slots().slot("Wheel");
    let log = Log::default();
    let tool = system.register(Recorder::new("zoom", vec![], vec![wheel], &log));
    system.add_tool(tool, path(&[0, 3])).unwrap();
    system.add_tool(tool, path(&[0, 4])).unwrap();

    system.process_event(axis(wheel, 0.2));

    assert_eq!(
        calls(&log),
        vec![
            ("zoom", Call::Perform(wheel, path(&[0, 3]))),
            ("zoom", Call::Perform(wheel, path(&[0, 4]))),
        ]
    );
}

#[test]
fn test_dispose_deactivates_every_active_instance() {
    let system = build(&mouse_config());
    let primary = system.slots().slot("PrimaryAction");
    let left = system.slots().slot("LeftButton");
    let wheel = system.slots().slot("Wheel");
    let log = Log::default();
    let picker = system.register(Recorder::new("picker", vec![primary], vec![], &log));
    let zoom = system.register(Recorder::new("zoom", vec![], vec![wheel], &log));
    system.add_tool(picker, path(&[0])).unwrap();
    system.add_tool(zoom, path(&[0, 1])).unwrap();
    system.add_tool(zoom, path(&[0, 2])).unwrap();
    system.process_event(axis(left, 1.0));
    log.lock().unwrap().clear();

    system.dispose();

    let mut deactivated: Vec<(&str, ScenePath)> = calls(&log)
        .into_iter()
        .map(|(name, call)| match call {
            Call::Deactivate(source, path) => {
                assert_eq!(source, InputSlot::REMOVE);
                (name, path)
            }
            other => panic!("unexpected call after dispose: {:?}", other),
        })
        .collect();
    deactivated.sort_by_key(|(name, path)| (*name, path.to_string()));
    assert_eq!(
        deactivated,
        vec![
            ("picker", path(&[0])),
            ("zoom", path(&[0, 1])),
            ("zoom", path(&[0, 2])),
        ]
    );
    assert!(system.is_disposed());
}

#[test]
fn test_detaching_active_tool_delivers_remove_deactivation() {
    let system = build(&mouse_config());
    let primary = system.slots().slot("PrimaryAction");
    let left = system.slots().slot("LeftButton");
    system.set_pick_system(hit(&[0, 1, 2]));
    let log = Log::default();
    let tool = system.register(Recorder::new("grab", vec![primary], vec![], &log));
    system.add_tool(tool, path(&[0, 1])).unwrap();
    system.process_event(axis(left, 1.0));

    system.remove_tool(tool, path(&[0, 1])).unwrap();

    assert!(!system.is_active(tool));
    assert_eq!(
        calls(&log).last(),
        Some(&("grab", Call::Deactivate(InputSlot::REMOVE, path(&[0, 1, 2]))))
    );
    // Released afterwards: nothing left to deactivate
    system.process_event(axis(left, 0.0));
    assert_eq!(calls(&log).len(), 2);
}

#[test]
fn test_threshold_device_drives_pick_tool() {
    let mut config = ToolSystemConfig::default();
    config.virtual_devices.push(VirtualDeviceConfig {
        kind: "threshold-button".into(),
        inputs: vec!["Trigger".into()],
        output: "Fire".into(),
        options: BTreeMap::from([("threshold".to_string(), "0.7".to_string())]),
    });
    let system = build(&config);
    let trigger = system.slots().slot("Trigger");
    let fire = system.slots().slot("Fire");
    let log = Log::default();
    let tool = system.register(Recorder::new("gun", vec![fire], vec![], &log));
    system.add_tool(tool, path(&[0])).unwrap();

    system.process_event(axis(trigger, 0.5));
    assert!(!system.is_active(tool));
    system.process_event(axis(trigger, 0.8));
    assert!(system.is_active(tool));
    system.process_event(axis(trigger, 0.1));
    assert!(!system.is_active(tool));
    assert_eq!(system.axis_state(fire), Some(AxisState::ORIGIN));
}

#[test]
fn test_drifting_camera_is_cut_off_by_iteration_guard() {
    let mut config = ToolSystemConfig::default();
    config.system.max_iterations = 10;
    let system = ToolSystem::new(
        Box::new(DriftingViewer {
            frames: AtomicU64::new(1),
        }),
        &config,
        &DeviceRegistry::with_builtins(),
    )
    .unwrap();

    let performs = Arc::new(AtomicUsize::new(0));
    struct CameraWatcher(Arc<AtomicUsize>);
    impl Tool for CameraWatcher {
        fn activation_slots(&self) -> &[InputSlot] {
            &[]
        }
        fn current_slots(&self) -> &[InputSlot] {
            &[InputSlot::WORLD_TO_CAMERA]
        }
        fn perform(&mut self, _ctx: &mut ToolContext<'_>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
    let watcher = system.register(CameraWatcher(performs.clone()));
    system.add_tool(watcher, path(&[0])).unwrap();

    let wheel = system.slots().slot("Wheel");
    system.process_event(axis(wheel, 0.1));

    let count = performs.load(Ordering::SeqCst);
    assert!(count >= 1, "camera updates never reached the tool");
    assert!(count <= 11, "guard let {} iterations through", count);

    // The system keeps working after the guard fired
    system.process_event(axis(wheel, 0.2));
    assert!(performs.load(Ordering::SeqCst) > count);
}

#[test]
fn test_camera_moved_once_per_event_settles() {
    let x = Arc::new(AtomicU64::new(0));
    let mut config = ToolSystemConfig::default();
    config.system.max_iterations = 50;
    let system = ToolSystem::new(
        Box::new(SharedCameraViewer { x: x.clone() }),
        &config,
        &DeviceRegistry::with_builtins(),
    )
    .unwrap();

    /// Moves the camera one unit on every wheel event
    struct Dolly(Arc<AtomicU64>, [InputSlot; 1]);
    impl Tool for Dolly {
        fn activation_slots(&self) -> &[InputSlot] {
            &[]
        }
        fn current_slots(&self) -> &[InputSlot] {
            &self.1
        }
        fn perform(&mut self, _ctx: &mut ToolContext<'_>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CameraWatcher(Arc<AtomicUsize>);
    impl Tool for CameraWatcher {
        fn activation_slots(&self) -> &[InputSlot] {
            &[]
        }
        fn current_slots(&self) -> &[InputSlot] {
            &[InputSlot::WORLD_TO_CAMERA]
        }
        fn perform(&mut self, _ctx: &mut ToolContext<'_>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let wheel = system.slots().slot("Wheel");
    let performs = Arc::new(AtomicUsize::new(0));
    let dolly = system.register(Dolly(x.clone(), [wheel]));
    let watcher = system.register(CameraWatcher(performs.clone()));
    system.add_tool(dolly, path(&[0])).unwrap();
    system.add_tool(watcher, path(&[0])).unwrap();

    for (i, value) in [0.1, 0.2, 0.3].into_iter().enumerate() {
        system.process_event(axis(wheel, value));
        assert_eq!(x.load(Ordering::SeqCst), i as u64 + 1);
        assert_eq!(performs.load(Ordering::SeqCst), i + 1);
    }

    // No movement, no implicit event
    system.process_event(axis(system.slots().slot("Other"), 0.1));
    assert_eq!(performs.load(Ordering::SeqCst), 3);
    let world_to_camera = system.transformation(InputSlot::WORLD_TO_CAMERA).unwrap();
    assert!(world_to_camera.approx_eq(&Transformation::from_translation(-3.0, 0.0, 0.0), 1e-12));
}

#[test]
fn test_transformation_events_update_slot_values() {
    let system = build(&ToolSystemConfig::default());
    let hand = system.slots().slot("HandTransformation");
    let frame = Transformation::from_translation(1.0, 2.0, 3.0);
    system.process_event(ToolEvent::from_transformation(
        EventSource::new("tracker"),
        5,
        hand,
        frame,
    ));
    assert_eq!(system.transformation(hand), Some(frame));
}

#[test]
fn test_animator_runs_on_system_time() {
    let system = build(&ToolSystemConfig::default());
    system.initialize_scene_tools().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    system.animator().schedule("spin", move |time, delta| {
        sink.lock().unwrap().push((time, delta));
        true
    });

    system.process_event(ToolEvent::from_axis(
        EventSource::new("clock"),
        1_000,
        InputSlot::SYSTEM_TIME,
        AxisState::new(16.0),
    ));

    assert_eq!(*seen.lock().unwrap(), vec![(1_000, 16)]);
    system.dispose();
}

#[test]
fn test_mouse_over_activates_pointer_hit_tools() {
    let system = build(&ToolSystemConfig::default());
    system.initialize_scene_tools().unwrap();
    system.set_pick_system(hit(&[0, 1, 2]));
    let log = Log::default();
    let tool = system.register(Recorder::new("hover", vec![InputSlot::POINTER_HIT], vec![], &log));
    system.add_tool(tool, path(&[0, 1])).unwrap();

    system.process_event(ToolEvent::from_transformation(
        EventSource::new("mouse"),
        0,
        InputSlot::POINTER_TRANSFORMATION,
        Transformation::IDENTITY,
    ));

    let mut waited = 0;
    while !system.is_active(tool) && waited < 200 {
        std::thread::sleep(Duration::from_millis(10));
        waited += 1;
    }
    assert_eq!(system.active_paths(tool), vec![path(&[0, 1, 2])]);

    // Pointer leaves the geometry
    system.set_pick_system(Box::new(FixedPick(Vec::new())));
    system.process_event(ToolEvent::from_transformation(
        EventSource::new("mouse"),
        1,
        InputSlot::POINTER_TRANSFORMATION,
        Transformation::from_translation(5.0, 0.0, 0.0),
    ));
    let mut waited = 0;
    while system.is_active(tool) && waited < 200 {
        std::thread::sleep(Duration::from_millis(10));
        waited += 1;
    }
    assert!(!system.is_active(tool));
    system.dispose();
}
