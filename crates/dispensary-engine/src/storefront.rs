//! Demo storefront: floor plan, shared resources and a seeded population.

use dispensary_common::{NpcId, ProfileRef, Rect, Vec2};
use dispensary_gameplay::{
    CheapState, DailySchedule, DayStartBehavior, GameTime, NavMesh, NpcRecord, NpcResult,
    PathMode, PathProgress, PathRegistry, PopulationDirector, ResourceHub, RichState,
    ShelfDirectory, StateTag, StoreServices, TimeWindow, WaypointPath,
};
use tracing::info;

/// Shop floor, origin at the front-left corner.
pub const SHOP_FLOOR: Rect = Rect::new(0.0, 0.0, 40.0, 30.0);
/// Street in front of the shop where NPCs live.
pub const STREET: Rect = Rect::new(-20.0, -40.0, 140.0, 40.0);

/// Path that loops around the shelf block.
pub const AISLE_LOOP: &str = "aisle-loop";
/// Path along the shop window, walked back and forth.
pub const WINDOW_WALK: &str = "window-walk";
/// Path from the street to the shop door, walked once.
pub const STREET_TO_DOOR: &str = "street-to-door";

const BROWSERS_PER_SHELF: usize = 3;
const WINDOW_START: Vec2 = Vec2::new(2.0, -2.0);

fn shelves() -> Vec<Vec2> {
    (0..5)
        .flat_map(|i| {
            let x = 8.0 + i as f32 * 4.0;
            [Vec2::new(x, 12.0), Vec2::new(x, 20.0)]
        })
        .collect()
}

fn paths() -> NpcResult<PathRegistry> {
    let mut paths = PathRegistry::new();
    paths.insert(
        AISLE_LOOP,
        WaypointPath::new(
            vec![
                Vec2::new(5.0, 8.0),
                Vec2::new(28.0, 8.0),
                Vec2::new(28.0, 24.0),
                Vec2::new(5.0, 24.0),
            ],
            PathMode::Loop,
        ),
    )?;
    paths.insert(
        WINDOW_WALK,
        WaypointPath::new(
            (0..6).map(|i| Vec2::new(2.0 + i as f32 * 6.0, -2.0)).collect(),
            PathMode::PingPong,
        ),
    )?;
    paths.insert(
        STREET_TO_DOOR,
        WaypointPath::new(
            vec![Vec2::new(60.0, -20.0), Vec2::new(20.0, -6.0), Vec2::new(20.0, 1.0)],
            PathMode::Once,
        ),
    )?;
    Ok(paths)
}

/// Builds the world-side collaborators of the demo store.
pub fn build_services(start_hour: u32, time_scale: f32, seed: u64) -> NpcResult<StoreServices> {
    let mut time = GameTime::with_time(start_hour, 0, 1);
    time.set_time_scale(time_scale);

    Ok(StoreServices {
        resources: ResourceHub::new(
            (0..5).map(|i| Vec2::new(33.0, 4.0 + i as f32 * 1.2)).collect(),
            Vec2::new(33.0, 2.0),
            (0..4).map(|i| Vec2::new(37.0, 12.0 + i as f32 * 1.2)).collect(),
            Vec2::new(37.0, 10.0),
            Vec2::new(38.0, 3.0),
            Vec2::new(34.5, 1.0),
        ),
        paths: paths()?,
        shopping: Box::new(ShelfDirectory::new(shelves(), BROWSERS_PER_SHELF, seed)),
        navmesh: NavMesh::new(vec![SHOP_FLOOR, STREET]),
        time,
    })
}

fn home_on_street(rng: &mut fastrand::Rng) -> Vec2 {
    Vec2::new(
        STREET.x + 5.0 + rng.f32() * (STREET.width - 10.0),
        STREET.y + 5.0 + rng.f32() * (STREET.height - 10.0),
    )
}

fn on_floor(rng: &mut fastrand::Rng) -> Vec2 {
    Vec2::new(2.0 + rng.f32() * 36.0, 2.0 + rng.f32() * 26.0)
}

/// Registers the cashier and `count - 1` customers.
///
/// Customers rotate through the store's cheap states so every handler is
/// exercised from the first tick.
pub fn populate(director: &mut PopulationDirector, count: usize, seed: u64) -> NpcResult<Vec<NpcId>> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut ids = Vec::with_capacity(count);
    if count == 0 {
        return Ok(ids);
    }

    let cashier = NpcRecord::new("cashier-01", Vec2::new(45.0, -10.0))
        .with_profile(ProfileRef::new("cashier"))
        .with_position(Vec2::new(34.5, 1.0))
        .with_schedule(DailySchedule::new(TimeWindow::new(7.0, 8.0), TimeWindow::new(21.0, 22.0)))
        .with_day_start(DayStartBehavior::Enter(RichState::CashierMovingToRegister))
        .with_state(Some(StateTag::Cheap(CheapState::CashierAtRegister)));
    ids.push(cashier.id().clone());
    director.add_record(cashier)?;

    let shelves = shelves();
    for i in 1..count {
        let id = format!("customer-{i:03}");
        let home = home_on_street(&mut rng);
        let base = NpcRecord::new(id.as_str(), home)
            .with_profile(ProfileRef::new("regular"))
            .with_home_rotation(rng.f32() * std::f32::consts::TAU)
            .with_schedule(
                DailySchedule::new(TimeWindow::new(8.0, 11.0), TimeWindow::new(17.0, 20.0))
                    .with_stagger(rng.f32()),
            );

        let record = match i % 8 {
            0 => base.with_day_start(DayStartBehavior::FollowPath(PathProgress::new(STREET_TO_DOOR, 0, false))),
            1 => {
                let progress = PathProgress::new(AISLE_LOOP, rng.usize(0..4), false);
                base.with_position(on_floor(&mut rng))
                    .with_state(Some(StateTag::Cheap(CheapState::PathFollow)))
                    .with_path(progress)
            },
            2 => base
                .with_position(shelves[rng.usize(0..shelves.len())])
                .with_state(Some(StateTag::Cheap(CheapState::Browse))),
            3 => base
                .with_position(Vec2::new(30.0, 6.0))
                .with_state(Some(StateTag::Cheap(CheapState::WaitForCashier))),
            4 => base
                .with_position(Vec2::new(35.0, 13.0))
                .with_state(Some(StateTag::Cheap(CheapState::WaitForPrescriptionQueue))),
            5 => base
                .with_position(WINDOW_START)
                .with_state(Some(StateTag::Cheap(CheapState::PathFollow)))
                .with_path(PathProgress::new(WINDOW_WALK, rng.usize(0..6), rng.bool())),
            6 => base
                .with_profile(ProfileRef::new("courier"))
                .with_position(Vec2::new(38.0, 4.0))
                .with_state(Some(StateTag::Cheap(CheapState::WaitForDelivery))),
            _ => base
                .with_position(on_floor(&mut rng))
                .with_state(Some(StateTag::Cheap(CheapState::Patrol))),
        };
        ids.push(record.id().clone());
        director.add_record(record)?;
    }

    info!("Populated store with {} NPCs", ids.len());
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispensary_gameplay::SimulationConfig;

    fn director() -> PopulationDirector {
        let services = build_services(9, 0.5, 3).expect("services");
        let config = SimulationConfig {
            rng_seed: Some(3),
            ..Default::default()
        };
        PopulationDirector::new(config, services).expect("director")
    }

    #[test]
    fn test_populate_registers_everyone() {
        let mut director = director();
        let ids = populate(&mut director, 30, 11).expect("populate");
        assert_eq!(ids.len(), 30);
        assert_eq!(director.registry().len(), 30);
        assert_eq!(ids[0].as_str(), "cashier-01");
        assert!(director.registry().iter().all(|(_, r)| !r.is_active()));
    }

    #[test]
    fn test_populate_is_seeded() {
        let mut a = director();
        let mut b = director();
        populate(&mut a, 15, 4).expect("populate");
        populate(&mut b, 15, 4).expect("populate");
        assert_eq!(a.export_all(), b.export_all());
    }

    #[test]
    fn test_saved_paths_resolve() {
        let services = build_services(9, 0.5, 3).expect("services");
        assert!(services.paths.validate(&PathProgress::new(AISLE_LOOP, 3, false)));
        assert!(services.paths.validate(&PathProgress::new(WINDOW_WALK, 5, true)));
        assert!(!services.paths.validate(&PathProgress::new(STREET_TO_DOOR, 3, false)));
    }

    #[test]
    fn test_resource_spots_are_walkable() {
        let services = build_services(9, 0.5, 3).expect("services");
        let hub = &services.resources;
        for spot in [
            hub.register.position(),
            hub.cashier_post.position(),
            hub.prescription_counter.position(),
            hub.delivery_spot.position(),
        ] {
            assert!(services.navmesh.is_walkable(spot), "{spot} is off the mesh");
        }
    }

    #[test]
    fn test_empty_population() {
        let mut director = director();
        assert!(populate(&mut director, 0, 1).expect("populate").is_empty());
    }
}
