#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Text formats, timeslice files and the info sidecar

mod common;

use common::{assemble, global_field, local_part, vector};
use ksprop_formats::{
    ByteOrder, Color, ColorVector, ExpectedShape, InfoItem, LatticeShape, SITE_RECORD_BYTES,
    info_path,
};
use ksprop_io::{
    Communicator, FormatKind, HypercubeLayout, IoConfig, LocalCluster, PropFile, RoundRobinLayout,
    SingleRank, SiteMap, SliceLayout, TimesliceFormat, TransferError, Verdict, WriteOrder,
    timeslice_path, write_timeslices, zeroed_field,
};
use pretty_assertions::assert_eq;
use std::path::Path;

fn write_cluster(path: &Path, shape: LatticeShape, map: &dyn SiteMap, format: FormatKind) {
    let results = LocalCluster::new(map.ranks()).run(|comm| {
        let locals: Vec<_> = Color::ALL
            .into_iter()
            .map(|color| local_part(&global_field(shape, color), shape, map, comm.rank()))
            .collect();
        let mut file = PropFile::create(&comm, path, shape, format, IoConfig::default())?;
        file.write_propagator(map, [&locals[0], &locals[1], &locals[2]])?;
        file.close()
    });
    for result in results {
        result.unwrap();
    }
}

fn read_cluster(
    path: &Path,
    shape: LatticeShape,
    map: &dyn SiteMap,
) -> (Vec<Vec<ColorVector<f32>>>, usize, FormatKind) {
    let results = LocalCluster::new(map.ranks()).run(|comm| {
        let mut parts: Vec<Vec<ColorVector<f32>>> =
            (0..3).map(|_| zeroed_field(map.sites_on(comm.rank()))).collect();
        let mut file = PropFile::open(
            &comm,
            path,
            ExpectedShape::Discover,
            None,
            IoConfig::default(),
        )?;
        let format = file.format();
        let [a, b, c] = &mut parts[..] else {
            unreachable!()
        };
        let reports = file.read_propagator(map, [a, b, c])?;
        assert!(reports.iter().all(|r| r.verdict == Verdict::Unchecked));
        file.close()?;
        Ok::<_, TransferError>((parts, reports.len(), format))
    });
    let results: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    let fields = (0..3)
        .map(|color| {
            let parts: Vec<_> = results.iter().map(|(p, _, _)| p[color].clone()).collect();
            assemble(&parts, shape, map)
        })
        .collect();
    (fields, results[0].1, results[0].2)
}

fn expected_fields(shape: LatticeShape) -> Vec<Vec<ColorVector<f32>>> {
    Color::ALL
        .into_iter()
        .map(|color| global_field(shape, color))
        .collect()
}

#[test]
fn ascii_round_trip_across_ranks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prop.txt");
    let shape = LatticeShape::new([2, 2, 2, 2]).unwrap();

    write_cluster(&path, shape, &HypercubeLayout::new(shape, 2).unwrap(), FormatKind::Ascii);

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "59355");
    assert!(lines[1].starts_with('"') && lines[1].ends_with('"'));
    assert_eq!(lines[2], "2\t2\t2\t2");
    assert_eq!(lines[3], "0");
    // Site 0, color 0: (0, -0), (0.125, -1), (0.25, -2)
    assert_eq!(lines[5], "1.2500000e-01\t-1.0000000e+00");
    assert_eq!(lines.len(), 3 + 3 * (1 + 16 * 3));
    assert!(info_path(&path).exists());

    let (back, reports, format) = read_cluster(&path, shape, &RoundRobinLayout::new(shape, 3));
    assert_eq!(format, FormatKind::Ascii);
    assert_eq!(reports, 3);
    assert_eq!(back, expected_fields(shape));
}

#[test]
fn ascii_colors_must_be_read_in_file_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prop.txt");
    let shape = LatticeShape::new([1, 1, 2, 1]).unwrap();
    write_cluster(&path, shape, &SliceLayout::new(shape, 1), FormatKind::Ascii);

    let map = SliceLayout::new(shape, 1);
    let mut part: Vec<ColorVector<f32>> = zeroed_field(2);
    let mut file = PropFile::open(
        &SingleRank,
        &path,
        shape.into(),
        Some(FormatKind::Ascii),
        IoConfig::default(),
    )
    .unwrap();
    assert!(file.read_color(&map, Color::ALL[1], &mut part).is_err());
}

#[test]
fn legacy_ascii_whole_propagator() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.txt");
    let shape = LatticeShape::new([2, 1, 1, 2]).unwrap();
    let map = RoundRobinLayout::new(shape, 2);

    write_cluster(&path, shape, &map, FormatKind::LegacyAscii);
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("59354\n"));
    assert_eq!(text.lines().count(), 3 + 4 * 9);
    assert!(!info_path(&path).exists());

    let (back, reports, format) = read_cluster(&path, shape, &SliceLayout::new(shape, 2));
    assert_eq!(format, FormatKind::LegacyAscii);
    assert_eq!(reports, 0);
    assert_eq!(back, expected_fields(shape));

    let results = LocalCluster::new(2).run(|comm| {
        let mut file = PropFile::open(
            &comm,
            &path,
            shape.into(),
            None,
            IoConfig::default(),
        )?;
        let mut part: Vec<ColorVector<f32>> = zeroed_field(2);
        file.read_color(&map, Color::ALL[0], &mut part).map(|_| ())
    });
    assert!(
        results
            .iter()
            .all(|r| matches!(r, Err(TransferError::InvalidOperation(_))))
    );
}

#[test]
fn binary_converts_to_ascii_and_back() {
    let dir = tempfile::tempdir().unwrap();
    let shape = LatticeShape::new([2, 2, 1, 2]).unwrap();
    let map = SliceLayout::new(shape, 1);
    let fields = expected_fields(shape);

    let binary = dir.path().join("prop.bin");
    write_cluster(&binary, shape, &map, FormatKind::Binary);

    let mut source = PropFile::open(
        &SingleRank,
        &binary,
        ExpectedShape::Discover,
        None,
        IoConfig::default(),
    )
    .unwrap();
    let mut back: Vec<Vec<ColorVector<f32>>> = (0..3).map(|_| zeroed_field(8)).collect();
    let [a, b, c] = &mut back[..] else {
        unreachable!()
    };
    source.read_propagator(&map, [a, b, c]).unwrap();
    source.close().unwrap();

    let text = dir.path().join("prop.txt");
    let mut target =
        PropFile::create(&SingleRank, &text, shape, FormatKind::Ascii, IoConfig::default())
            .unwrap();
    target
        .write_propagator(&map, [&back[0], &back[1], &back[2]])
        .unwrap();
    target.close().unwrap();

    let (again, _, format) = read_cluster(&text, shape, &map);
    assert_eq!(format, FormatKind::Ascii);
    assert_eq!(again, fields);
}

#[test]
fn info_sidecar_lists_header_and_checksums() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prop");
    let shape = LatticeShape::new([2, 2, 2, 4]).unwrap();
    let map = SliceLayout::new(shape, 2);

    let results = LocalCluster::new(2).run(|comm| {
        let locals: Vec<_> = Color::ALL
            .into_iter()
            .map(|color| local_part(&global_field(shape, color), shape, &map, comm.rank()))
            .collect();
        let mut file =
            PropFile::create(&comm, &path, shape, FormatKind::Binary, IoConfig::default())?;
        file.add_info(InfoItem::new("quark.mass", "0.0125"));
        file.add_info(InfoItem::new("source.type", "point"));
        let sums = file.write_propagator(&map, [&locals[0], &locals[1], &locals[2]])?;
        let stamp = file.header().time_stamp.as_str();
        file.close()?;
        Ok::<_, TransferError>((sums, stamp))
    });
    let results: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    let (sums, stamp) = &results[0];
    assert_eq!(&results[1].1, stamp);

    let info = std::fs::read_to_string(info_path(&path)).unwrap();
    let expected = format!(
        "magic_number 59355\n\
         time_stamp \"{stamp}\"\n\
         checksums[3] \"{}\" \"{}\" \"{}\"\n\
         nx 2\n\
         ny 2\n\
         nz 2\n\
         nt 4\n\
         quark.mass 0.0125\n\
         source.type point\n",
        sums[0], sums[1], sums[2]
    );
    assert_eq!(info, expected);
}

#[test]
fn info_sidecar_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prop");
    let shape = LatticeShape::new([1, 1, 1, 2]).unwrap();
    let config = IoConfig {
        write_info_file: false,
        ..IoConfig::default()
    };
    let mut file =
        PropFile::create(&SingleRank, &path, shape, FormatKind::Binary, config).unwrap();
    file.write_color(
        &SliceLayout::new(shape, 1),
        Color::ALL[0],
        &global_field(shape, Color::ALL[0]),
    )
    .unwrap();
    file.close().unwrap();
    assert!(path.exists());
    assert!(!info_path(&path).exists());
}

#[test]
fn binary_timeslices_from_many_ranks() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("prop");
    let shape = LatticeShape::new([2, 2, 1, 3]).unwrap();
    let map = RoundRobinLayout::new(shape, 3);
    let config = IoConfig {
        write_byte_order: WriteOrder::Big,
        ..IoConfig::default()
    };

    let results = LocalCluster::new(3).run(|comm| {
        let locals: Vec<_> = Color::ALL
            .into_iter()
            .map(|color| local_part(&global_field(shape, color), shape, &map, comm.rank()))
            .collect();
        write_timeslices(
            &comm,
            &base,
            shape,
            &map,
            [&locals[0], &locals[1], &locals[2]],
            TimesliceFormat::Binary,
            &config,
        )
    });
    let paths = results.into_iter().map(Result::unwrap).next().unwrap();
    assert_eq!(paths.len(), 3);

    let record = 3 * SITE_RECORD_BYTES;
    for t in 0..shape.nt() {
        assert_eq!(paths[t], timeslice_path(&base, t));
        let bytes = std::fs::read(&paths[t]).unwrap();
        assert_eq!(bytes.len(), shape.slice_volume() * record);
        for (i, site) in shape.timeslice(t).enumerate() {
            for color in Color::ALL {
                let at = i * record + color.index() as usize * SITE_RECORD_BYTES;
                let v = ColorVector::decode(&bytes[at..at + SITE_RECORD_BYTES], ByteOrder::Big);
                assert_eq!(v, vector(site, color));
            }
        }
    }
}

#[test]
fn ascii_timeslices_hold_nine_lines_per_site() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("prop");
    let shape = LatticeShape::new([2, 1, 1, 2]).unwrap();
    let map = SliceLayout::new(shape, 2);

    let results = LocalCluster::new(2).run(|comm| {
        let locals: Vec<_> = Color::ALL
            .into_iter()
            .map(|color| local_part(&global_field(shape, color), shape, &map, comm.rank()))
            .collect();
        write_timeslices(
            &comm,
            &base,
            shape,
            &map,
            [&locals[0], &locals[1], &locals[2]],
            TimesliceFormat::Ascii,
            &IoConfig::default(),
        )
    });
    for result in results {
        result.unwrap();
    }

    let text = std::fs::read_to_string(timeslice_path(&base, 1)).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2 * 9);
    // Site 2, color 0, component 0
    assert_eq!(lines[0], "1.0000000e+00\t-2.5000000e-01");
    // Site 2, color 1, component 0
    assert_eq!(lines[3], "2.0000000e+00\t-2.5000000e-01");
}
