use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use chrono::{DateTime, Utc};
use mseedscale::pipeline::process_input;
use mseedscale::scale::{IneligiblePolicy, ScaleConfig};
use mseedscale::sink::DirectSink;
use mseedscale::trace::PackConfig;
use mseedscale::{
    DataEncoding, EncodedTimeseries, ExtraHeaders, MSeed3Header, MSeed3Record, MSeedError,
    SourceIdentifier,
};

fn start() -> Result<DateTime<Utc>, MSeedError> {
    Ok("2014-11-28T12:00:09Z".parse::<DateTime<Utc>>()?)
}

fn record(id: &str, encoded_data: EncodedTimeseries, encoding: DataEncoding) -> Result<MSeed3Record, MSeedError> {
    let num_samples = encoded_data.reconcile_num_samples(0) as usize;
    let header = MSeed3Header::new(start()?, encoding, 10.0, num_samples);
    Ok(MSeed3Record::new(
        header,
        SourceIdentifier::from(id),
        ExtraHeaders::new(),
        encoded_data,
    ))
}

fn scale(alpha: f64, beta: f64, ineligible: IneligiblePolicy) -> ScaleConfig {
    ScaleConfig {
        alpha,
        beta,
        orientation: Some('T'),
        ineligible,
    }
}

#[test]
fn scales_file_to_file() -> Result<(), MSeedError> {
    let dir = tempfile::tempdir()?;
    let in_path = dir.path().join("in.ms3");
    let out_path = dir.path().join("out.ms3");

    let mut rec = record(
        "FDSN:CO_BIRD_00_H_H_Z",
        EncodedTimeseries::Int32(vec![1, 2, 3]),
        DataEncoding::INT32,
    )?;
    {
        let mut buf_writer = BufWriter::new(File::create(&in_path)?);
        rec.write_to(&mut buf_writer)?;
        buf_writer.flush()?;
    }

    let mut sink = DirectSink::new(BufWriter::new(File::create(&out_path)?));
    let summary = process_input(
        BufReader::new(File::open(&in_path)?),
        &scale(10.0, 2.0, IneligiblePolicy::PassThrough),
        &PackConfig::default(),
        &mut sink,
    )?;
    drop(sink);
    assert_eq!(summary.records, 1);
    assert_eq!(summary.transformed, 1);
    assert_eq!(summary.samples, 3);

    let records = mseedscale::read_mseed3(&mut BufReader::new(File::open(&out_path)?))?;
    assert_eq!(records.len(), 1);
    let out = &records[0];
    assert_eq!(out.int_samples(), Some(&[12, 14, 16][..]));
    assert_eq!(out.identifier.to_string(), "FDSN:CO_BIRD_00_H_H_T");
    assert_eq!(out.header.encoding, DataEncoding::STEIM2);
    assert_eq!(out.header.get_start_as_utc()?, start()?);
    assert_eq!(out.header.sample_rate_period, 10.0);
    Ok(())
}

#[test]
fn float_records_pass_through_unchanged() -> Result<(), MSeedError> {
    let mut rec = record(
        "FDSN:CO_BIRD_00_H_H_Z",
        EncodedTimeseries::Float32(vec![0.25, -1.5, 3.0]),
        DataEncoding::FLOAT32,
    )?;
    let input = rec.to_bytes()?;

    let mut sink = DirectSink::new(Vec::new());
    let summary = process_input(
        &input[..],
        &scale(10.0, 2.0, IneligiblePolicy::PassThrough),
        &PackConfig::default(),
        &mut sink,
    )?;
    assert_eq!(summary.passed, 1);
    assert_eq!(sink.into_inner(), input);
    Ok(())
}

#[test]
fn long_records_split_and_rejoin() -> Result<(), MSeedError> {
    // a random walk with steps wide enough to defeat the densest packings
    let mut value: i32 = 0;
    let data: Vec<i32> = (0..2000)
        .map(|i: i32| {
            value += (i * 7919 % 20011) - 10005;
            value
        })
        .collect();
    let mut rec = record(
        "FDSN:CO_BIRD_00_H_H_Z",
        EncodedTimeseries::Int32(data.clone()),
        DataEncoding::INT32,
    )?;
    let input = rec.to_bytes()?;

    let pack = PackConfig::default();
    let mut sink = DirectSink::new(Vec::new());
    let summary = process_input(
        &input[..],
        &scale(0.0, 1.0, IneligiblePolicy::Drop),
        &pack,
        &mut sink,
    )?;
    assert!(summary.records_out > 1);
    assert_eq!(summary.samples, data.len());

    let output = sink.into_inner();
    let records = mseedscale::read_mseed3(&mut &output[..])?;
    assert_eq!(records.len(), summary.records_out);
    let mut rejoined = Vec::new();
    let mut expected_start = start()?;
    for out in &records {
        assert!(out.get_record_size() as usize <= pack.max_record_length);
        assert_eq!(out.header.get_start_as_utc()?, expected_start);
        let samples = out.int_samples().unwrap_or_default();
        expected_start += chrono::Duration::milliseconds(100 * samples.len() as i64);
        rejoined.extend_from_slice(samples);
    }
    assert_eq!(rejoined, data);
    Ok(())
}

#[test]
fn int16_input_is_scaled() -> Result<(), MSeedError> {
    let mut rec = record(
        "XFDSN:CO_BIRD__H_H_Z",
        EncodedTimeseries::Int16(vec![-3, 0, 3]),
        DataEncoding::INT16,
    )?;
    let input = rec.to_bytes()?;
    let mut sink = DirectSink::new(Vec::new());
    process_input(
        &input[..],
        &scale(0.5, -1.0, IneligiblePolicy::Drop),
        &PackConfig::default(),
        &mut sink,
    )?;
    let output = sink.into_inner();
    let records = mseedscale::read_mseed3(&mut &output[..])?;
    // 3.5 -> 4, 0.5 -> 0, -2.5 -> -2
    assert_eq!(records[0].int_samples(), Some(&[4, 0, -2][..]));
    assert_eq!(records[0].identifier.to_string(), "XFDSN:CO_BIRD__H_H_T");
    Ok(())
}

#[test]
fn truncated_input_is_an_error() -> Result<(), MSeedError> {
    let mut rec = record(
        "FDSN:CO_BIRD_00_H_H_Z",
        EncodedTimeseries::Int32(vec![1, 2, 3]),
        DataEncoding::INT32,
    )?;
    let mut input = rec.to_bytes()?;
    input.extend_from_slice(&input.clone()[..30]);
    let mut sink = DirectSink::new(Vec::new());
    let result = process_input(
        &input[..],
        &scale(0.0, 1.0, IneligiblePolicy::Drop),
        &PackConfig::default(),
        &mut sink,
    );
    assert!(result.is_err());
    assert!(!sink.into_inner().is_empty());
    Ok(())
}
