use detsdw::lattice::{NeighDir, PeriodicChain, PeriodicSquareLattice, NEIGH_DIRS};

#[test]
fn test_neighbor_table_wraps_periodically() {
    let lattice = PeriodicSquareLattice::new(4);
    assert_eq!(lattice.n(), 16);

    // site = y·L + x
    let s = lattice.coords_to_site(3, 0);
    assert_eq!(s, 3);
    assert_eq!(lattice.neighbor(NeighDir::XPlus, s), lattice.coords_to_site(0, 0));
    assert_eq!(lattice.neighbor(NeighDir::XMinus, s), lattice.coords_to_site(2, 0));
    assert_eq!(lattice.neighbor(NeighDir::YPlus, s), lattice.coords_to_site(3, 1));
    assert_eq!(lattice.neighbor(NeighDir::YMinus, s), lattice.coords_to_site(3, 3));

    assert_eq!(
        lattice.neighbors(5),
        &[
            lattice.neighbor(NeighDir::XPlus, 5),
            lattice.neighbor(NeighDir::YPlus, 5),
            lattice.neighbor(NeighDir::XMinus, 5),
            lattice.neighbor(NeighDir::YMinus, 5),
        ]
    );
}

#[test]
fn test_opposite_directions_are_inverse() {
    let lattice = PeriodicSquareLattice::new(5);
    for site in 0..lattice.n() {
        let (x, y) = lattice.site_to_coords(site);
        assert_eq!(lattice.coords_to_site(x, y), site);
        let xp = lattice.neighbor(NeighDir::XPlus, site);
        assert_eq!(lattice.neighbor(NeighDir::XMinus, xp), site);
        let yp = lattice.neighbor(NeighDir::YPlus, site);
        assert_eq!(lattice.neighbor(NeighDir::YMinus, yp), site);
        for dir in NEIGH_DIRS {
            assert_ne!(lattice.neighbor(dir, site), site);
        }
    }
}

#[test]
fn test_time_chain_wraps_between_one_and_m() {
    let chain = PeriodicChain::new(6);
    assert_eq!(chain.len(), 6);
    assert_eq!(chain.plus(6), 1);
    assert_eq!(chain.minus(1), 6);
    assert_eq!(chain.plus(3), 4);
    assert_eq!(chain.minus(3), 2);

    let single = PeriodicChain::new(1);
    assert_eq!(single.plus(1), 1);
    assert_eq!(single.minus(1), 1);
}
