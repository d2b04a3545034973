use dicom::core::Tag;
use dicom::object::DefaultDicomObject;

/// Typed reads of the image pixel module attributes the redactor relies on.
pub trait ElementAccess {
    fn element_u16(&self, tag: Tag) -> Option<u16>;
}

impl ElementAccess for DefaultDicomObject {
    fn element_u16(&self, tag: Tag) -> Option<u16> {
        self.element(tag).ok().and_then(|e| e.to_int::<u16>().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::{DataElement, PrimitiveValue, VR};
    use dicom::dictionary_std::{tags, StandardDataDictionary};
    use dicom::object::mem::InMemElement;
    use dicom::object::{FileDicomObject, FileMetaTableBuilder};

    fn object_with(elements: Vec<InMemElement>) -> DefaultDicomObject {
        let meta = FileMetaTableBuilder::new()
            .transfer_syntax("1.2.840.10008.1.2.1")
            .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.7")
            .media_storage_sop_instance_uid("1.2.3")
            .build()
            .expect("meta");
        let mut obj = FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
        for elem in elements {
            obj.put(elem);
        }
        obj
    }

    #[test]
    fn reads_unsigned_shorts_and_tolerates_absence() {
        let obj = object_with(vec![
            DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(512_u16)),
            // Some writers store numeric attributes as text.
            DataElement::new(tags::BITS_STORED, VR::IS, PrimitiveValue::from("12")),
        ]);

        assert_eq!(obj.element_u16(tags::ROWS), Some(512));
        assert_eq!(obj.element_u16(tags::BITS_STORED), Some(12));
        assert_eq!(obj.element_u16(tags::COLUMNS), None);
    }
}
