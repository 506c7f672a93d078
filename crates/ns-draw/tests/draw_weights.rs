//! Weighted draws and histogram filling.

use approx::assert_relative_eq;
use ns_draw::{
    Bins, DrawError, DrawOptions, Drawer, Histogram, JaggedCol, NegativeWeightPolicy, Table, draw,
    fold_draw,
};

fn events() -> Table {
    Table::new()
        .with(
            "Jet_pt",
            JaggedCol::from_rows(&[vec![42.0, 15.0, 10.5], vec![], vec![11.5], vec![50.0, 5.0]]),
        )
        .unwrap()
        .with(
            "Jet_eta",
            JaggedCol::from_rows(&[vec![-2.2, 0.4, 0.5], vec![], vec![1.5], vec![-0.1, -3.0]]),
        )
        .unwrap()
        .with("MET_pt", vec![46.5, 30.0, 82.0, 8.9])
        .unwrap()
        .with("eventWeight", vec![-1.0, 0.0, 2.0, 2.0])
        .unwrap()
}

fn assert_close(got: &[f64], want: &[f64]) {
    assert_eq!(got.len(), want.len(), "got {got:?}, want {want:?}");
    for (g, w) in got.iter().zip(want) {
        assert_relative_eq!(*g, *w, epsilon = 1e-12);
    }
}

#[test]
fn flat_weights() {
    let out = draw(&events(), "length(Jet_pt)", None, Some("eventWeight")).unwrap();
    assert_close(out.x(), &[3.0, 0.0, 1.0, 2.0]);
    assert_close(out.weights.as_deref().unwrap(), &[-1.0, 0.0, 2.0, 2.0]);
}

#[test]
fn missing_in_any_dimension_drops_the_weight_too() {
    let out = draw(&events(), "Jet_pt[0]:Jet_pt[1]", None, Some("eventWeight")).unwrap();
    assert_close(out.x(), &[42.0, 50.0]);
    assert_close(out.y().unwrap(), &[15.0, 5.0]);
    assert_close(out.weights.as_deref().unwrap(), &[-1.0, 2.0]);
}

#[test]
fn weight_expression_over_columns() {
    let out = draw(&events(), "Jet_pt[0]", None, Some("length(Jet_pt)")).unwrap();
    assert_close(out.x(), &[42.0, 11.5, 50.0]);
    assert_close(out.weights.as_deref().unwrap(), &[3.0, 1.0, 2.0]);
}

#[test]
fn jagged_weight_with_element_selection() {
    let out = draw(
        &events(),
        "Jet_pt",
        Some("abs(Jet_eta) > 1 and MET_pt > 10"),
        Some("Jet_eta*2"),
    )
    .unwrap();
    assert_close(out.x(), &[42.0, 11.5]);
    assert_close(out.weights.as_deref().unwrap(), &[-4.4, 3.0]);
}

#[test]
fn flat_weight_against_jagged_value_is_shape_mismatch() {
    let r = draw(&events(), "Jet_pt", None, Some("eventWeight"));
    assert!(matches!(r, Err(DrawError::ShapeMismatch(_))));
}

#[test]
fn per_row_weight_broadcasts_through_element_expression() {
    let out = draw(&events(), "Jet_pt", Some("MET_pt > 40"), Some("eventWeight * (Jet_pt > 0)"))
        .unwrap();
    assert_close(out.x(), &[42.0, 15.0, 10.5, 11.5]);
    assert_close(out.weights.as_deref().unwrap(), &[-1.0, -1.0, -1.0, 2.0]);
}

#[test]
fn weighted_histogram() {
    let mut drawer = Drawer::new().with_options(DrawOptions {
        bins: Some(Bins::Edges(vec![0.0, 20.0, 60.0])),
        ..DrawOptions::default()
    });
    let h = drawer.draw_hist(&events(), "Jet_pt[0]", None, Some("eventWeight")).unwrap();
    let Histogram::OneD(h) = h else { panic!("expected 1D histogram") };
    assert_close(&h.counts, &[2.0, 1.0]);
    assert_close(&h.sumw2, &[4.0, 5.0]);
    assert_eq!(h.entries, 3);
    assert_eq!(h.negative_weight_entries, 1);
}

#[test]
fn negative_weight_error_policy() {
    let mut drawer = Drawer::new().with_options(DrawOptions {
        bins: Some("6,0,60".parse().unwrap()),
        negative_weight_policy: NegativeWeightPolicy::Error,
        ..DrawOptions::default()
    });
    let r = drawer.draw_hist(&events(), "Jet_pt[0]", None, Some("eventWeight"));
    assert!(matches!(r, Err(DrawError::Histogram(_))));
}

#[test]
fn two_dimensional_histogram_falls_back_to_x_bins() {
    let mut drawer = Drawer::new().with_options(DrawOptions {
        bins: Some("2,0,60".parse().unwrap()),
        ..DrawOptions::default()
    });
    let h = drawer.draw_hist(&events(), "Jet_pt[0]:Jet_pt[1]", None, Some("eventWeight")).unwrap();
    let Histogram::TwoD(h) = h else { panic!("expected 2D histogram") };
    assert_eq!(h.shape(), (2, 2));
    assert_relative_eq!(h.get(1, 0), 1.0);
    assert_relative_eq!(h.integral(), 1.0);
}

#[test]
fn chunked_fold_equals_single_pass() {
    let table = events();
    let mut drawer = Drawer::new().with_options(DrawOptions {
        bins: Some("5,0,50".parse().unwrap()),
        ..DrawOptions::default()
    });
    let weight = "eventWeight * (Jet_pt > 0)";
    let single = drawer.draw_hist(&table, "Jet_pt", Some("MET_pt > 20"), Some(weight)).unwrap();
    for rows in 1..=4 {
        let folded = fold_draw(
            &mut drawer,
            table.chunks(rows).map(Ok),
            "Jet_pt",
            Some("MET_pt > 20"),
            Some(weight),
        )
        .unwrap();
        assert_eq!(folded.rows, 4);
        assert_eq!(folded.hist.as_ref(), Some(&single), "chunk size {rows}");
    }
}
