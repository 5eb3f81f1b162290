//! State-record aliasing and executed transitions, exercised the way an
//! embedder would drive them: handles and internal objects sharing one
//! record, transitions recorded then submitted, and the gap between the
//! tracked belief and driver truth probed on both sides of the submit.

use slate_core::{
    device::{Device, SetStateError},
    hal::noop,
    resource::{TextureDescriptor, TextureFormat, TextureUsage},
    state::{ImageLayout, QueueOwner, ResourceState},
    TransitionError,
};

const FAMILY: u32 = 0;

fn init() -> Device<noop::Api> {
    let _ = env_logger::builder().is_test(true).try_init();
    let (raw, queue) = noop::create();
    Device::new(raw, queue, FAMILY)
}

fn desc() -> TextureDescriptor<'static> {
    TextureDescriptor {
        label: Some("test"),
        width: 32,
        height: 32,
        mip_level_count: 1,
        format: TextureFormat::Rgba8Unorm,
        usage: TextureUsage::SAMPLED | TextureUsage::COPY_SRC,
    }
}

#[test]
fn handle_copies_share_one_record() {
    let device = init();
    let tex = device.create_texture(&desc()).unwrap();
    let initial = tex.state(&device).unwrap();

    let copy = tex.clone();
    assert_eq!(copy.state(&device).unwrap(), initial);

    // Overwriting through the copy is immediately visible through the
    // original and through any further copy.
    let new_state = ResourceState::new(ImageLayout::ShaderReadOnlyOptimal, QueueOwner::Ignored);
    copy.set_state(&device, new_state).unwrap();
    assert_eq!(tex.state(&device).unwrap(), new_state);
    assert_eq!(copy.state(&device).unwrap(), new_state);
    assert_eq!(tex.clone().state(&device).unwrap(), new_state);

    // Bookkeeping overwrites never touch the device.
    assert_eq!(
        device.hal_device().driver_state(tex.raw()).unwrap(),
        initial
    );

    tex.set_state(&device, initial).unwrap();
    assert_eq!(copy.state(&device).unwrap(), initial);

    device.delete_texture(&tex).unwrap();
}

#[test]
fn internal_object_and_handle_observe_each_other() {
    let device = init();
    let tex = device.create_texture(&desc()).unwrap();
    let initial = tex.state(&device).unwrap();

    let internal = device.instantiate_texture(&tex).unwrap();
    assert_eq!(internal.current_layout(&device).unwrap(), initial.layout);
    assert_eq!(
        internal.current_queue_owner(&device).unwrap(),
        initial.owner
    );

    // Mutation from the internal side shows through the handle.
    internal
        .update_layout(&device, ImageLayout::TransferSrcOptimal)
        .unwrap();
    assert_eq!(
        tex.state(&device).unwrap().layout,
        ImageLayout::TransferSrcOptimal
    );

    // And the other way around.
    tex.set_state(
        &device,
        ResourceState::new(ImageLayout::ShaderReadOnlyOptimal, QueueOwner::Ignored),
    )
    .unwrap();
    assert_eq!(
        internal.current_layout(&device).unwrap(),
        ImageLayout::ShaderReadOnlyOptimal
    );
    assert_eq!(
        internal.current_queue_owner(&device).unwrap(),
        QueueOwner::Ignored
    );

    internal
        .set_queue_owner(&device, QueueOwner::Family(FAMILY))
        .unwrap();
    assert_eq!(
        tex.state(&device).unwrap().owner,
        QueueOwner::Family(FAMILY)
    );

    device.delete_texture(&tex).unwrap();
}

#[test]
fn executed_transition_is_record_true_then_device_true() {
    let device = init();
    let tex = device.create_texture(&desc()).unwrap();
    let initial = tex.state(&device).unwrap();

    let desired = ResourceState::new(ImageLayout::ShaderReadOnlyOptimal, QueueOwner::Ignored);
    device.set_texture_state(&tex, desired).unwrap();

    // The record reflects intent right away; the driver has seen
    // nothing yet.
    assert_eq!(tex.state(&device).unwrap(), desired);
    assert_eq!(
        device.hal_device().driver_state(tex.raw()).unwrap(),
        initial
    );

    device.submit(false).unwrap();
    assert_eq!(
        device.hal_device().driver_state(tex.raw()).unwrap(),
        desired
    );

    device.submit(true).unwrap();
    device.delete_texture(&tex).unwrap();
}

#[test]
fn requesting_the_current_state_records_nothing() {
    let device = init();
    let tex = device.create_texture(&desc()).unwrap();

    let state = ResourceState::new(ImageLayout::General, QueueOwner::Ignored);
    device.set_texture_state(&tex, state).unwrap();
    device.submit(false).unwrap();
    let index_after_transition = device.submit(false).unwrap();

    // A no-op request leaves the record alone and records no commands:
    // the following submit carries an empty stream and driver state is
    // untouched.
    device.set_texture_state(&tex, state).unwrap();
    let index = device.submit(false).unwrap();
    assert_eq!(index, index_after_transition + 1);
    assert_eq!(tex.state(&device).unwrap(), state);
    assert_eq!(device.hal_device().driver_state(tex.raw()).unwrap(), state);

    device.submit(true).unwrap();
    device.delete_texture(&tex).unwrap();
}

#[test]
fn round_trip_transition_restores_the_original_state() {
    let device = init();
    let tex = device.create_texture(&desc()).unwrap();

    let s0 = ResourceState::new(ImageLayout::ShaderReadOnlyOptimal, QueueOwner::Ignored);
    device.set_texture_state(&tex, s0).unwrap();
    device.submit(true).unwrap();

    let s1 = ResourceState::new(ImageLayout::TransferDstOptimal, QueueOwner::Ignored);
    device.set_texture_state(&tex, s1).unwrap();
    device.submit(true).unwrap();
    device.set_texture_state(&tex, s0).unwrap();
    device.submit(true).unwrap();

    assert_eq!(tex.state(&device).unwrap(), s0);
    assert_eq!(device.hal_device().driver_state(tex.raw()).unwrap(), s0);

    device.delete_texture(&tex).unwrap();
}

#[test]
fn cross_queue_handoff_needs_a_submit_per_hop() {
    let device = init();

    // Start from an externally owned image so that every hop below is a
    // real ownership transfer.
    let external = ResourceState::new(ImageLayout::General, QueueOwner::External);
    let raw = device.hal_device().register_external_texture(external);
    let tex = device.wrap_texture(raw, &desc(), Some(external), true);

    // Hop 1: acquire from the external owner. Record-true immediately,
    // device-true only after the acquire is submitted.
    let owned = ResourceState::new(ImageLayout::General, QueueOwner::Family(FAMILY));
    device.set_texture_state(&tex, owned).unwrap();
    assert_eq!(tex.state(&device).unwrap(), owned);
    assert_eq!(device.hal_device().driver_state(raw).unwrap(), external);
    device.submit(false).unwrap();
    assert_eq!(device.hal_device().driver_state(raw).unwrap(), owned);

    // Hop 2: release back to the external owner.
    device.set_texture_state(&tex, external).unwrap();
    assert_eq!(device.hal_device().driver_state(raw).unwrap(), owned);
    device.submit(false).unwrap();
    assert_eq!(device.hal_device().driver_state(raw).unwrap(), external);

    // Hop 3: acquire on a different family.
    let other = ResourceState::new(ImageLayout::General, QueueOwner::Family(1));
    device.set_texture_state(&tex, other).unwrap();
    device.submit(false).unwrap();
    assert_eq!(device.hal_device().driver_state(raw).unwrap(), other);

    // Hop 4: a transfer between two real families (release + acquire).
    device.set_texture_state(&tex, owned).unwrap();
    device.submit(true).unwrap();
    assert_eq!(device.hal_device().driver_state(raw).unwrap(), owned);

    device.delete_texture(&tex).unwrap();
}

#[test]
fn unsupported_transitions_have_no_side_effects() {
    let device = init();
    let tex = device.create_texture(&desc()).unwrap();
    let initial = tex.state(&device).unwrap();

    let err = device
        .set_texture_state(
            &tex,
            ResourceState::new(ImageLayout::Undefined, QueueOwner::Family(FAMILY)),
        )
        .unwrap_err();
    assert_eq!(
        err,
        SetStateError::Transition(TransitionError::UndefinedDestination)
    );
    assert_eq!(tex.state(&device).unwrap(), initial);

    // Both owners outside our command-stream authority: nothing we
    // could record on either side.
    tex.set_state(
        &device,
        ResourceState::new(ImageLayout::General, QueueOwner::External),
    )
    .unwrap();
    let err = device
        .set_texture_state(
            &tex,
            ResourceState::new(ImageLayout::General, QueueOwner::Foreign),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        SetStateError::Transition(TransitionError::ForeignHandoff { .. })
    ));

    device.delete_texture(&tex).unwrap();
}

#[test]
fn unpinned_wrap_transitions_from_an_unknown_state() {
    let device = init();

    // Interop code creates a texture behind our back and leaves it in a
    // state the wrap does not vouch for.
    let driver_truth = ResourceState::new(ImageLayout::General, QueueOwner::External);
    let raw = device.hal_device().register_external_texture(driver_truth);
    let tex = device.wrap_texture(raw, &desc(), None, false);

    assert_eq!(
        tex.state(&device).unwrap(),
        ResourceState::new(ImageLayout::Undefined, QueueOwner::Ignored)
    );

    // The first executed transition must not trust the record; it plans
    // from an undefined starting layout and still lands on the desired
    // state.
    let desired = ResourceState::new(ImageLayout::ShaderReadOnlyOptimal, QueueOwner::Ignored);
    device.set_texture_state(&tex, desired).unwrap();
    device.submit(true).unwrap();
    assert_eq!(
        device.hal_device().driver_state(raw).unwrap().layout,
        ImageLayout::ShaderReadOnlyOptimal
    );

    device.delete_texture(&tex).unwrap();
    // We never took ownership, so the native object survives deletion.
    assert!(device.hal_device().is_alive(raw));
}

#[test]
fn pinned_wrap_trusts_the_caller_seed() {
    let device = init();

    let seed = ResourceState::new(ImageLayout::TransferSrcOptimal, QueueOwner::Family(FAMILY));
    let raw = device.hal_device().register_external_texture(seed);
    let tex = device.wrap_texture(raw, &desc(), Some(seed), true);

    assert_eq!(tex.state(&device).unwrap(), seed);

    let desired = ResourceState::new(
        ImageLayout::ShaderReadOnlyOptimal,
        QueueOwner::Family(FAMILY),
    );
    device.set_texture_state(&tex, desired).unwrap();
    device.submit(true).unwrap();
    assert_eq!(device.hal_device().driver_state(raw).unwrap(), desired);

    device.delete_texture(&tex).unwrap();
    // Ownership was taken, so deletion frees the native object.
    assert!(!device.hal_device().is_alive(raw));
}

#[test]
fn operations_through_a_dead_handle_fail() {
    let device = init();
    let tex = device.create_texture(&desc()).unwrap();
    let copy = tex.clone();

    assert!(tex.is_valid(&device));
    device.delete_texture(&tex).unwrap();
    assert!(!tex.is_valid(&device));
    assert!(!copy.is_valid(&device));

    assert!(tex.state(&device).is_err());
    assert!(copy
        .set_state(
            &device,
            ResourceState::new(ImageLayout::General, QueueOwner::Ignored),
        )
        .is_err());
    assert!(device.instantiate_texture(&tex).is_err());
    assert!(device
        .set_texture_state(
            &tex,
            ResourceState::new(ImageLayout::General, QueueOwner::Ignored),
        )
        .is_err());
    assert!(device.delete_texture(&copy).is_err());
}
