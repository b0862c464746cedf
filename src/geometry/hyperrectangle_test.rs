use super::*;

fn rect(bounds: &[f64]) -> Hyperrectangle {
    Hyperrectangle::from_bounds(bounds).unwrap()
}

#[test]
fn test_compact_string_codec() {
    let b = rect(&[0.0, 5.0, -1.5, 6.0]);
    assert_eq!(b.to_compact_string(), "[[0,5]:[-1.5,6]]");

    let parsed: Hyperrectangle = "[[0,5]:[-1.5,6]]".parse().unwrap();
    assert_eq!(parsed, b);

    let half_open: Hyperrectangle = "[(0,2.5]:[1,2)]".parse().unwrap();
    assert!(!half_open.interval(0).unwrap().is_begin_included());
    assert!(!half_open.interval(1).unwrap().is_end_included());
    assert_eq!(half_open.to_string(), "[(0,2.5]:[1,2)]");

    assert!("[]".parse::<Hyperrectangle>().unwrap().is_full_space());
}

#[test]
fn test_parse_rejects_malformed_descriptors() {
    assert!("0,5".parse::<Hyperrectangle>().is_err());
    assert!("[[0,5,6]]".parse::<Hyperrectangle>().is_err());
    assert!("[[a,5]]".parse::<Hyperrectangle>().is_err());
    assert!("[[5,0]]".parse::<Hyperrectangle>().is_err());
    assert!("[(1,1)]".parse::<Hyperrectangle>().is_err());
}

#[test]
fn test_intersects_honours_open_bounds() {
    let left = rect(&[0.0, 1.0]);
    let touching = rect(&[1.0, 2.0]);
    assert!(left.intersects(&touching));

    let right_open: Hyperrectangle = "[(1,2]]".parse().unwrap();
    assert!(!left.intersects(&right_open));

    let disjoint = rect(&[3.0, 4.0]);
    assert!(!left.intersects(&disjoint));

    let inner = rect(&[0.2, 0.3]);
    assert!(left.intersects(&inner));
    assert!(inner.intersects(&left));

    assert!(left.intersects(&Hyperrectangle::full_space()));
}

#[test]
fn test_covers() {
    let outer = rect(&[0.0, 10.0, 0.0, 10.0]);
    assert!(outer.covers(&rect(&[1.0, 2.0, 0.0, 10.0])));
    assert!(!outer.covers(&rect(&[1.0, 11.0, 0.0, 1.0])));
    assert!(Hyperrectangle::full_space().covers(&outer));
    assert!(!outer.covers(&Hyperrectangle::full_space()));

    let open_begin: Hyperrectangle = "[(0,10]:[0,10]]".parse().unwrap();
    assert!(!open_begin.covers(&outer));
    assert!(outer.covers(&open_begin));
}

#[test]
fn test_split_produces_disjoint_covering_parts() {
    let b = rect(&[0.0, 4.0, 0.0, 2.0]);
    let left = b.split_left(1.0, 0, true).unwrap();
    let right = b.split_right(1.0, 0, false).unwrap();

    assert_eq!(left.to_string(), "[[0,1]:[0,2]]");
    assert_eq!(right.to_string(), "[(1,4]:[0,2]]");
    assert!(!left.intersects(&right));
    assert!(b.covers(&left));
    assert!(b.covers(&right));
    assert!((left.volume() + right.volume() - b.volume()).abs() < 1e-9);
}

#[test]
fn test_split_rejects_out_of_range_position() {
    let b = rect(&[0.0, 4.0]);
    assert!(b.split_left(5.0, 0, true).is_err());
    assert!(b.split_left(1.0, 3, true).is_err());
}

#[test]
fn test_covering_box() {
    let covering = Hyperrectangle::covering_box(&[
        rect(&[0.0, 1.0, 5.0, 6.0]),
        rect(&[-2.0, 0.5, 5.5, 9.0]),
    ])
    .unwrap();
    assert_eq!(covering, rect(&[-2.0, 1.0, 5.0, 9.0]));

    assert!(Hyperrectangle::covering_box(&[]).unwrap().is_full_space());
    assert!(Hyperrectangle::covering_box(&[rect(&[0.0, 1.0]), rect(&[0.0, 1.0, 0.0, 1.0])]).is_err());
}

#[test]
fn test_center_and_point_containment() {
    let b = rect(&[0.0, 4.0, 2.0, 4.0]);
    assert_eq!(b.center(), vec![2.0, 3.0]);
    assert!(b.contains_point(&[4.0, 4.0]));
    assert!(!b.contains_point(&[4.1, 4.0]));
    assert!(!b.contains_point(&[1.0]));
}
