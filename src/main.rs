use std::path::PathBuf;

use dicom_annotate::{
    enums::{Label, SortBy},
    session::{Session, SessionConfig},
};

fn main() {
    env_logger::init();

    let directory = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("dicom"));

    let mut session =
        Session::open_directory(&directory, SortBy::default(), SessionConfig::default())
            .expect("should have loaded files from directory");

    let patient = session.patient();
    println!("patient: {} ({})", patient.name, patient.patient_id);
    println!(
        "modality {} | slice thickness {} | kvp {} | tube current {}",
        patient.modality, patient.slice_thickness, patient.kvp, patient.tube_current
    );
    println!("volume: {:?}", session.volume().dim());

    let receipt = session
        .segment_airway()
        .expect("airway threshold segmentation failed");
    println!("airway voxels: {}", receipt.changed);

    for view in session.views() {
        let name = format!("{:?}.png", view.orientation).to_lowercase();
        view.image.save(&name).expect("should have saved view");
        println!("wrote {name}");
    }

    session
        .export_mask(&PathBuf::from("mask.nii"))
        .expect("should have exported mask");
    session
        .export_mesh_ply(Label::Airway, &PathBuf::from("airway.ply"))
        .expect("should have exported airway mesh");
}
